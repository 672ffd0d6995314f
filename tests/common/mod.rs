#![allow(dead_code)]

use semdex::chunking::chunk;
use semdex::indexing::indexer::DEFAULT_MAX_TOKENS_PER_CHUNK;
use semdex::vector::EmbeddingError;
use semdex::{
    EmbeddingProvider, GroupFlag, IndexScope, IndexerOptions, ScanOptions, SimilarityIndexStore,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const TEST_MODEL: &str = "test-model";
pub const DIMENSION: usize = 16;

pub struct TestProject {
    pub dir: TempDir,
    root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir
            .path()
            .canonicalize()
            .expect("Failed to resolve temp dir");
        Self { dir, root }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.root.join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn remove_file(&self, path: &str) {
        fs::remove_file(self.root.join(path)).expect("Failed to remove file");
    }

    /// Canonical project root, as stored in file urls.
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::new(vec![self.root.clone()], IndexerOptions::new(TEST_MODEL))
    }
}

pub fn scope(name: &str, flag: u64) -> IndexScope {
    IndexScope::new(name, GroupFlag::new(flag))
}

/// Number of enabled files stored for `scope`.
pub fn file_count<S: SimilarityIndexStore>(store: &S, scope: &IndexScope) -> usize {
    store
        .files_in_scope(scope)
        .unwrap()
        .into_iter()
        .filter(|f| f.is_enabled)
        .count()
}

/// Deterministic bag-of-bytes embedding; counts provider calls.
#[derive(Default)]
pub struct CountingProvider {
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        for word in text.split_whitespace() {
            let bucket = word
                .bytes()
                .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % DIMENSION] += 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for CountingProvider {
    fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Fails every call.
#[derive(Default)]
pub struct FailingProvider {
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for FailingProvider {
    fn embed(&self, _model: &str, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::Unavailable("service down".to_string()))
    }
}

/// Cancels the given token the first time it is asked to embed.
pub struct CancelingProvider {
    pub token: CancellationToken,
    inner: CountingProvider,
}

impl CancelingProvider {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            inner: CountingProvider::new(),
        }
    }
}

impl EmbeddingProvider for CancelingProvider {
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.token.cancel();
        self.inner.embed(model, texts)
    }
}

/// Stored text of a single-chunk file: tokens re-joined by single spaces.
pub fn chunked(text: &str) -> String {
    let chunks = chunk(text, DEFAULT_MAX_TOKENS_PER_CHUNK);
    assert_eq!(chunks.len(), 1, "expected a single chunk");
    chunks[0].text.clone()
}

pub mod sample_text {
    pub const PARSER: &str = "fn parse(input: &str) -> Result<Ast, Error> { lexer tokens grammar }";
    pub const NETWORK: &str = "async fn connect(addr: SocketAddr) { tcp stream retry backoff }";
    pub const README: &str = "Getting started: install the tool and run the scan command";
}
