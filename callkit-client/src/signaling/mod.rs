mod channel;
mod link;

pub use channel::*;
pub use link::*;
