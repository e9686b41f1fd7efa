use thiserror::Error;

/// Errors shared across the chime crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration file or environment override could not be read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reminder key part is empty or contains the `/` separator.
    #[error("Invalid reminder key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
