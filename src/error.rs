//! Error types for the embedding index
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::storage::StorageError;
use crate::vector::{EmbeddingError, VectorError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("File '{path}' is not valid UTF-8 text")]
    NotText { path: PathBuf },

    /// Embedding provider errors
    #[error("Failed to embed '{path}': {source}")]
    Embedding {
        path: PathBuf,
        source: EmbeddingError,
    },

    #[error("Invalid embedding for '{path}': {source}")]
    Vector { path: PathBuf, source: VectorError },

    /// Storage errors
    #[error("Index storage failed: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("Scan root '{path}' does not exist or is not a directory")]
    InvalidRoot { path: PathBuf },

    #[error("Scan worker terminated unexpectedly: {reason}")]
    WorkerFailed { reason: String },

    /// General errors for cases where we need to preserve existing behavior
    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::NotText { .. } => "NOT_TEXT",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Vector { .. } => "VECTOR_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::InvalidRoot { .. } => "INVALID_ROOT",
            Self::WorkerFailed { .. } => "WORKER_FAILED",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::NotText { .. } => vec![
                "Binary files cannot be embedded, add the path to .semdexignore",
                "Use exclude_patterns in .semdex/settings.toml to skip it",
            ],
            Self::Embedding { .. } => vec![
                "Check that the embedding model is available",
                "Run 'semdex scan' again once the provider is reachable",
            ],
            Self::Storage(_) => vec![
                "Check disk space and permissions in the index directory",
                "Delete the index database and run 'semdex scan' to rebuild it",
            ],
            Self::ConfigError { .. } => vec![
                "Run 'semdex config' to inspect the effective settings",
                "Run 'semdex init --force' to regenerate the settings file",
            ],
            Self::InvalidRoot { .. } => {
                vec!["Check the [scan] roots entry in .semdex/settings.toml"]
            }
            _ => vec![],
        }
    }

    /// Whether this error marks the file as failed rather than exceptional.
    ///
    /// Read and decode problems are local to one file; everything else counts
    /// toward the scan's abort threshold.
    pub fn is_file_failure(&self) -> bool {
        matches!(self, Self::FileRead { .. } | Self::NotText { .. })
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
