pub mod call;
pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod signaling;
pub mod transport;

pub use call::*;
pub use config::*;
pub use error::*;
pub use media::*;
pub use session::*;
pub use signaling::*;
pub use transport::*;

pub use callkit_core::{CallError, CallSnapshot, CallStatus};
