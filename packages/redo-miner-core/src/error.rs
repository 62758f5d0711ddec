//! Miner error types.

use thiserror::Error;

/// Errors raised while decoding change vectors or maintaining transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MinerError {
    /// Declared part/column counts disagree with the record framing
    #[error("Malformed record in {context}: {detail}")]
    MalformedRecord {
        context: &'static str,
        detail: String,
    },

    /// Opcode is valid but the decode path does not implement it
    #[error("Opcode {op:#06x} is not supported by the {path} path")]
    UnsupportedOpcode { op: u16, path: &'static str },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MinerError {
    /// Builds a `MalformedRecord` error.
    pub fn malformed(context: &'static str, detail: impl Into<String>) -> Self {
        MinerError::MalformedRecord {
            context,
            detail: detail.into(),
        }
    }

    /// Returns whether processing must stop rather than skip the record.
    ///
    /// Dropping an unsupported change would silently lose a before-image.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MinerError::UnsupportedOpcode { .. })
    }
}

impl From<serde_json::Error> for MinerError {
    fn from(error: serde_json::Error) -> Self {
        MinerError::Serialization(error.to_string())
    }
}
