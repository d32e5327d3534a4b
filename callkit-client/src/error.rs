use crate::media::TrackSource;
use callkit_core::CallError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to capture {0} was denied")]
    PermissionDenied(TrackSource),

    #[error("no {0} device found")]
    DeviceNotFound(TrackSource),

    #[error("{0} device is in use by another application")]
    DeviceBusy(TrackSource),

    #[error("capture is unavailable: {0}")]
    UnsupportedEnvironment(String),
}

impl From<MediaError> for CallError {
    fn from(e: MediaError) -> Self {
        let detail = e.to_string();
        match e {
            MediaError::PermissionDenied(_) => CallError::PermissionDenied(detail),
            MediaError::DeviceNotFound(_) => CallError::DeviceNotFound(detail),
            MediaError::DeviceBusy(_) => CallError::DeviceBusy(detail),
            MediaError::UnsupportedEnvironment(_) => CallError::UnsupportedEnvironment(detail),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport has no video sender to replace")]
    NoVideoSender,

    #[error("transport is closed")]
    Closed,

    #[error("malformed session description: {0}")]
    InvalidDescription(String),

    #[error("webrtc: {0}")]
    Rtc(#[from] webrtc::Error),
}

impl From<TransportError> for CallError {
    fn from(e: TransportError) -> Self {
        CallError::NegotiationFailed(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("relay connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("relay rejected authentication: {0}")]
    Rejected(String),

    #[error("relay did not answer authentication in time")]
    AuthTimeout,

    #[error("relay closed the connection")]
    Closed,

    #[error("malformed relay frame: {0}")]
    Protocol(#[from] serde_json::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionLookupError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("session directory unavailable: {0}")]
    Unavailable(String),
}

impl From<SessionLookupError> for CallError {
    fn from(e: SessionLookupError) -> Self {
        CallError::SessionDirectory(e.to_string())
    }
}
