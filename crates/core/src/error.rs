//! Core error types

use thiserror::Error;

/// Core error type for wsbind
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration value could not be interpreted
    #[error("Configuration error: {0}")]
    Config(String),

    /// Properties resource could not be located
    #[error("Could not find properties file {0}")]
    ResourceNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[cfg(feature = "toml")]
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
