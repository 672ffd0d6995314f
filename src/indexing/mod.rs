pub mod fingerprint;
pub mod indexer;
pub mod progress;
pub mod scan;
pub mod service;
pub mod walker;

pub use fingerprint::{Digest, HashType, chunk_hash, file_hash};
pub use indexer::{IncrementalIndexer, IndexOutcome, IndexerOptions};
pub use progress::{ProgressSink, ScanCounts, ScanEvent, ScanReport, ScanState};
pub use scan::{DEFAULT_MAX_EXCEPTIONS, ScanCoordinator, ScanOptions};
pub use service::ScanService;
pub use walker::{FileWalker, WalkOptions};
