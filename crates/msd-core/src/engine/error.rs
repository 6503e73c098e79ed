use thiserror::Error;

pub use super::config::ConfigError;
pub use crate::core::error::{FormatError, RangeError};

#[derive(Debug, Error)]
pub enum MsdError {
    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("Malformed molecule data: {0}")]
    Format(#[from] FormatError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Molecule mismatch: {0}")]
    Molecule(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
