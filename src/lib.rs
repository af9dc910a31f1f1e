//! Verified recursive move: copy every file, check its CRC-32 against the
//! source, and only then delete the original.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use config::MoveConfig;
pub use crate::core::Mover;
pub use error::{MoveError, Result};
