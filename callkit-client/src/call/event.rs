use crate::error::MediaError;
use crate::media::{AcquiredMedia, LocalTrack, TrackKind};
use crate::session::SessionRecord;
use crate::signaling::{ChannelStatus, Refusal};
use crate::transport::TransportEvent;
use callkit_core::{CallError, SignalMessage};

/// User actions on a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    Start,
    Leave { complete_session: bool },
    ToggleScreenShare,
    SetTrackEnabled { kind: TrackKind, enabled: bool },
}

/// What a successful start produces: an admitted session and captured media.
#[derive(Debug)]
pub struct CallSetup {
    pub record: SessionRecord,
    pub media: AcquiredMedia,
}

/// Everything the call state machine reacts to, processed one at a time.
///
/// Results of work spawned by the coordinator carry the `generation` they were started
/// in; after a leave the generation moves on and late results are discarded.
#[derive(Debug)]
pub enum CallEvent {
    Command(CallCommand),

    MediaReady {
        generation: u64,
        result: Result<CallSetup, CallError>,
    },

    DisplayReady {
        generation: u64,
        result: Result<LocalTrack, MediaError>,
    },

    CameraRestored {
        generation: u64,
        result: Result<LocalTrack, MediaError>,
    },

    /// The platform stopped a screen capture (its own "stop sharing" control).
    ScreenCaptureEnded { generation: u64, track_id: String },

    Signal(SignalMessage),

    /// The relay turned down one of our messages to the room.
    Refused(Refusal),

    Transport {
        generation: u64,
        event: TransportEvent,
    },

    Channel(ChannelStatus),
}

impl From<CallCommand> for CallEvent {
    fn from(command: CallCommand) -> Self {
        CallEvent::Command(command)
    }
}
