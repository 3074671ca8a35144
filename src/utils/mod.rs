//! The `utils` module holds the pieces shared by every other module: the crate
//! error type and the tracing subscriber setup.

pub mod error;
pub mod logging;

pub use error::{FanoutError, Result};
