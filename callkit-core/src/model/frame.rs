use crate::model::participant::ParticipantId;
use crate::model::session::SessionId;
use crate::model::signaling::{IceServerConfig, SignalKind, SignalMessage};
use serde::{Deserialize, Serialize};

/// Envelope for everything that crosses a client <-> relay WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum RelayFrame {
    /// First frame on every connection, and again after each reconnect.
    #[serde(rename_all = "camelCase")]
    Authenticate { token: String },

    #[serde(rename_all = "camelCase")]
    Welcome {
        participant_id: ParticipantId,
        ice_servers: Vec<IceServerConfig>,
    },

    /// Authentication failed; the relay closes the socket after sending it.
    Rejected { reason: String },

    /// A room-level refusal (for example a third participant). `kind` is the
    /// refused message.
    #[serde(rename_all = "camelCase")]
    Error {
        session_id: SessionId,
        kind: SignalKind,
        reason: String,
    },

    Signal(SignalMessage),
}
