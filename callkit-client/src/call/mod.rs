mod coordinator;
mod event;
mod handle;

pub use coordinator::*;
pub use event::*;
pub use handle::*;
