use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored vector is invalid: {0}")]
    Vector(#[from] VectorError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("An enabled file for '{url}' already exists in group '{group_name}'")]
    Duplicate { group_name: String, url: PathBuf },

    #[error("Invalid record in column {column}: {reason}")]
    InvalidRecord {
        column: &'static str,
        reason: String,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
