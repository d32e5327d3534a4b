mod backend;
mod gateway;
mod track;

pub use backend::*;
pub use gateway::*;
pub use track::*;
