use serde::Serialize;
use thiserror::Error;

/// Error events surfaced to whoever drives a call. Each occurrence is reported once.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum CallError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    #[error("signaling channel disconnected")]
    SignalingDisconnected,

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("connectivity checks failed")]
    ConnectivityFailed,

    #[error("session is not active (status: {0})")]
    SessionNotActive(String),

    #[error("session directory error: {0}")]
    SessionDirectory(String),

    /// The relay would not seat this participant in the room.
    #[error("relay refused the call: {0}")]
    RoomRefused(String),
}

impl CallError {
    /// Transient errors are warnings: the component that raised them is still retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::SignalingDisconnected)
    }
}
