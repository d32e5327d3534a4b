mod call_room;
mod room_manager;

pub use call_room::*;
pub use room_manager::*;
