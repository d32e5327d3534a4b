pub mod error;
pub mod model;
pub mod utils;

pub use error::CallError;
pub use model::*;
