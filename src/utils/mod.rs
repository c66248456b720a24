//! Configuration management

pub mod config;

pub use config::{ConfigError, ConfigurationManager, FusionConfig, ParameterUpdates};
