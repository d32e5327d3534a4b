use crate::media::backend::{CaptureDevice, CapturedDevice};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Media stream id shared by every outgoing track of a call.
pub const LOCAL_STREAM_ID: &str = "callkit-local";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackSource::Microphone => TrackKind::Audio,
            TrackSource::Camera | TrackSource::Screen => TrackKind::Video,
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackSource::Microphone => "microphone",
            TrackSource::Camera => "camera",
            TrackSource::Screen => "screen",
        };
        f.write_str(name)
    }
}

/// What a transport sender sees of a local track.
#[derive(Clone)]
pub struct OutgoingTrack {
    pub id: String,
    pub kind: TrackKind,
    pub rtc: Arc<dyn TrackLocal + Send + Sync>,
}

impl fmt::Debug for OutgoingTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A captured local track: the hardware handle plus the sample track it feeds.
///
/// The device is stopped exactly once, either by [`LocalTrack::stop`] or when the
/// track is dropped, whichever comes first.
pub struct LocalTrack {
    id: String,
    source: TrackSource,
    rtc: Arc<TrackLocalStaticSample>,
    device: Box<dyn CaptureDevice>,
    ended: Option<oneshot::Receiver<()>>,
    stopped: AtomicBool,
}

impl LocalTrack {
    pub fn new(source: TrackSource, captured: CapturedDevice) -> Self {
        let id = format!("{}-{}", source, Uuid::new_v4());
        let codec = match source.kind() {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
        };
        let rtc = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            LOCAL_STREAM_ID.to_owned(),
        ));

        let CapturedDevice { device, ended } = captured;
        device.bind(rtc.clone());

        Self {
            id,
            source,
            rtc,
            device,
            ended,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn kind(&self) -> TrackKind {
        self.source.kind()
    }

    pub fn label(&self) -> String {
        self.device.label()
    }

    /// The handle given to the peer transport. The device stays owned here.
    pub fn outgoing(&self) -> OutgoingTrack {
        OutgoingTrack {
            id: self.id.clone(),
            kind: self.kind(),
            rtc: self.rtc.clone(),
        }
    }

    /// Fires when the capture ends outside our control (the platform "stop sharing" button).
    pub fn take_ended(&mut self) -> Option<oneshot::Receiver<()>> {
        self.ended.take()
    }

    pub fn set_enabled(&self, enabled: bool) {
        if !self.is_stopped() {
            self.device.set_enabled(enabled);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Stopping {} track {}", self.source, self.id);
        self.device.stop();
    }
}

impl Drop for LocalTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
