/// The main library module for semdex
pub mod chunking;
pub mod config;
pub mod display;
pub mod error;
pub mod indexing;
pub mod retrieve;
pub mod storage;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use indexing::{
    IncrementalIndexer, IndexOutcome, IndexerOptions, ScanCoordinator, ScanEvent, ScanOptions,
    ScanReport, ScanService, ScanState,
};
pub use retrieve::{SearchHit, build_context, find_similar, format_chunk};
pub use storage::{
    MemoryStore, SimilarityIndexStore, SqliteStore, StorageError, StorageResult,
};
pub use types::{FileId, FilePartId, GroupFilter, GroupFlag, IndexScope, ProgressStatus};
pub use vector::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
