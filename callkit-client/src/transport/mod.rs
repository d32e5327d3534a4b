mod negotiator;
mod peer_transport;
mod rtc;

pub use negotiator::*;
pub use peer_transport::*;
pub use rtc::*;
