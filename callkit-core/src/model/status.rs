use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally observable call status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    #[default]
    Idle,
    AcquiringMedia,
    Negotiating,
    Connected,
    Renegotiating,
    Disconnected,
    Ended,
}

impl CallStatus {
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether `self -> next` is a legal transition. `Ended` is reachable from everywhere
    /// and left by nothing.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;

        match (self, next) {
            (Ended, _) => false,
            (_, Ended) => true,
            (Idle, AcquiringMedia) => true,
            (AcquiringMedia, Negotiating) => true,
            (Negotiating, Connected) | (Negotiating, Disconnected) => true,
            (Connected, Renegotiating) | (Connected, Disconnected) => true,
            (Renegotiating, Connected) | (Renegotiating, Disconnected) => true,
            (Disconnected, Connected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatus::Idle => "idle",
            CallStatus::AcquiringMedia => "acquiring-media",
            CallStatus::Negotiating => "negotiating",
            CallStatus::Connected => "connected",
            CallStatus::Renegotiating => "renegotiating",
            CallStatus::Disconnected => "disconnected",
            CallStatus::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// The only call state a UI layer may read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub is_connected: bool,
    pub remote_participant_present: bool,
    /// Set while the signaling channel is retrying its relay connection.
    pub signaling_degraded: bool,
    pub screen_sharing: bool,
}
