//! Error types for the fusion engine

use std::fmt;

use crate::utils::config::ConfigError;

/// Errors raised by the fusion engine
#[derive(Debug, Clone, PartialEq)]
pub enum FusionError {
    /// Caller supplied malformed input (undersized arrays, out-of-range coordinates, bad covariance)
    InvalidArgument { parameter: String, reason: String },
    /// Planar conversion requested before any reference point exists
    NotInitialized,
    /// Attempt to move the reference point after it was frozen
    ReferenceFrozen { latitude: f64, longitude: f64 },
    /// Innovation covariance could not be inverted
    SingularMatrix { context: String },
    /// An update produced NaN or infinite state
    NonFiniteState { context: String },
    /// Session is not recording
    SessionInactive,
    /// Configuration failure
    Config(ConfigError),
}

impl FusionError {
    pub fn invalid_argument(parameter: &str, reason: impl Into<String>) -> Self {
        FusionError::InvalidArgument {
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    /// Numeric faults are skipped locally and the prior state kept
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FusionError::SingularMatrix { .. } | FusionError::NonFiniteState { .. }
        )
    }
}

impl fmt::Display for FusionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionError::InvalidArgument { parameter, reason } => {
                write!(f, "Invalid argument '{}': {}", parameter, reason)
            }
            FusionError::NotInitialized => {
                write!(f, "Coordinate reference point not initialized")
            }
            FusionError::ReferenceFrozen { latitude, longitude } => {
                write!(
                    f,
                    "Reference point already fixed at ({:.6}, {:.6})",
                    latitude, longitude
                )
            }
            FusionError::SingularMatrix { context } => {
                write!(f, "Singular matrix during {}", context)
            }
            FusionError::NonFiniteState { context } => {
                write!(f, "Non-finite state after {}", context)
            }
            FusionError::SessionInactive => write!(f, "Recording session is not active"),
            FusionError::Config(error) => write!(f, "Configuration error: {}", error),
        }
    }
}

impl std::error::Error for FusionError {}

impl From<ConfigError> for FusionError {
    fn from(error: ConfigError) -> Self {
        FusionError::Config(error)
    }
}

/// Result type for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;
