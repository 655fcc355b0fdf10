//! Error types for VahanaIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// VahanaIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file error
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration write error
    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Wire serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
