use crate::call::CallEvent;
use crate::error::TransportError;
use crate::media::{OutgoingTrack, TrackKind};
use async_trait::async_trait;
use callkit_core::{IceCandidateDescriptor, IceServerConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity of the peer-to-peer transport, mirroring the peer connection state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionPhase {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Events a transport produces for the call's state machine.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local ICE candidate was gathered and must be trickled to the remote peer.
    CandidateGenerated(IceCandidateDescriptor),

    PhaseChanged(ConnectionPhase),

    /// The remote peer started sending a track.
    RemoteTrack { kind: TrackKind, id: String },
}

/// Where a transport delivers its events. Each sink is stamped with the call generation
/// that created the transport, so events from a torn-down transport are recognisable.
#[derive(Clone)]
pub struct TransportEventSink {
    generation: u64,
    inbox: mpsc::UnboundedSender<CallEvent>,
}

impl TransportEventSink {
    pub fn new(generation: u64, inbox: mpsc::UnboundedSender<CallEvent>) -> Self {
        Self { generation, inbox }
    }

    pub fn emit(&self, event: TransportEvent) {
        let event = CallEvent::Transport {
            generation: self.generation,
            event,
        };
        if self.inbox.send(event).is_err() {
            debug!("Call is gone; dropping transport event");
        }
    }
}

/// The peer-to-peer media transport of one call.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn add_track(&self, track: &OutgoingTrack) -> Result<(), TransportError>;

    /// Swap the outgoing video in place, without renegotiation. `None` sends nothing.
    /// Fails with [`TransportError::NoVideoSender`] when no video sender exists yet.
    async fn replace_video_track(&self, track: Option<&OutgoingTrack>) -> Result<(), TransportError>;

    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), TransportError>;

    /// Abandon a local offer that has not been answered.
    async fn rollback(&self) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidateDescriptor) -> Result<(), TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        ice_servers: &[IceServerConfig],
        events: TransportEventSink,
    ) -> Result<Box<dyn PeerTransport>, TransportError>;
}
