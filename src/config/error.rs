//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Redis timeout must be between 1 and 60 seconds")]
    InvalidRedisTimeout,

    #[error("{0} must be greater than 0 and at most 1")]
    InvalidFactor(&'static str),

    #[error("{0} must be greater than 0")]
    MustBePositive(&'static str),
}
