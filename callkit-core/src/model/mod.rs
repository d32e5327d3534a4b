mod frame;
mod participant;
mod session;
mod signaling;
mod status;

pub use frame::RelayFrame;
pub use participant::ParticipantId;
pub use session::SessionId;
pub use signaling::{IceCandidateDescriptor, IceServerConfig, SdpBlob, SignalKind, SignalMessage, SignalPayload};
pub use status::{CallSnapshot, CallStatus};
