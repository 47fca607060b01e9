pub mod error;
pub mod types;
pub mod config;

pub use error::{RethinkError, RethinkResult};
pub use types::*;
