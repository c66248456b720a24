//! Input validation and error types

pub mod data;
pub mod error;

pub use data::{InputValidator, ValidationConfig};
pub use error::{FusionError, FusionResult};
