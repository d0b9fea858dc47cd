//! Error types for MIME body recovery.

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Invalid transfer or header encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Multipart entity without a boundary parameter.
    #[error("Missing boundary in multipart message")]
    MissingBoundary,

    /// The stored blob could not be inflated.
    #[error("Inflate error: {0}")]
    Inflate(#[from] std::io::Error),

    /// Unknown compression tag on a stored blob.
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),
}
