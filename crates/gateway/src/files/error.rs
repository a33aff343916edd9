//! Errors for filesystem operations inside the allowed roots.

use thiserror::Error;

use super::resolver::ResolveError;

/// Errors that can occur while browsing or reading.
#[derive(Debug, Error)]
pub enum FsError {
    /// The path is malformed or not expressible relative to a root.
    #[error("invalid path: {0}")]
    Invalid(String),

    /// The path does not resolve inside any allowed root.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path resolved to something other than a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The path resolved to something other than a regular file.
    #[error("not a file: {0}")]
    NotAFile(String),

    /// The file is larger than the requested byte limit.
    #[error("file too large: {size} bytes, limit: {limit} bytes")]
    TooLarge { path: String, size: u64, limit: u64 },

    /// The content is not valid in the requested encoding.
    #[error("unable to decode {path} with encoding: {encoding}")]
    DecodeFailure { path: String, encoding: String },

    /// The requested encoding is not supported.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Unexpected OS error on the path under operation.
    #[error("filesystem error: {0}")]
    Internal(#[from] std::io::Error),
}

impl From<ResolveError> for FsError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Invalid(msg) => FsError::Invalid(msg),
            ResolveError::NotFound(path) => FsError::NotFound(path),
        }
    }
}
