use callkit_core::{ParticipantId, SessionId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("empty token")]
    EmptyToken,

    #[error("unknown token")]
    UnknownToken,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} is full")]
    Full(SessionId),

    #[error("{participant} is not in room {session}")]
    NotMember {
        session: SessionId,
        participant: ParticipantId,
    },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("relay server failed: {0}")]
    Serve(#[from] std::io::Error),
}
