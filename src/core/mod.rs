pub mod requirements;
pub mod types;

pub use types::*;
