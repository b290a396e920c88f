//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The path is empty or escapes the provider root.
    #[error("invalid path: {path:?}")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// A path component that must be a directory is a file.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: String,
    },

    /// Another process holds the provider's root lock.
    #[error("storage locked: another process has exclusive access")]
    Locked,

    /// The provider was opened read-only.
    #[error("storage is read-only")]
    ReadOnly,
}

impl StorageError {
    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Creates a not-a-directory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory { path: path.into() }
    }
}
