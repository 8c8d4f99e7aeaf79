//! Error types for blobmig

use thiserror::Error;

/// Result type alias for blobmig operations
pub type Result<T> = std::result::Result<T, BlobmigError>;

/// Main error type for record decoding
#[derive(Error, Debug)]
pub enum BlobmigError {
    #[error("Decompression failed ({codec}): {reason}")]
    Decompress { codec: String, reason: String },

    #[error("Decompressed content is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Content is not valid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Normalization exceeded maximum depth of {limit}")]
    NormalizationDepthExceeded { limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BlobmigError {
    /// Create a decompression error for the given codec
    pub fn decompress(codec: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decompress {
            codec: codec.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-friendly name of the failure kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            BlobmigError::Decompress { .. } => "decompress",
            BlobmigError::Encoding(_) => "encoding",
            BlobmigError::Parse(_) => "parse",
            BlobmigError::NormalizationDepthExceeded { .. } => "normalization_depth_exceeded",
            BlobmigError::Io(_) => "io",
            BlobmigError::Serialization(_) => "serialization",
            BlobmigError::Config(_) => "config",
        }
    }
}
