//! Incremental per-file indexing
//!
//! Decides for one file whether its stored embeddings are still valid, and
//! re-embeds only when the file's chunk digests (or the embedding model)
//! changed. New parts are computed in full before anything is written, then
//! committed with a single [`SimilarityIndexStore::replace_parts`] call.

use crate::chunking::{self, Chunk};
use crate::error::{IndexError, IndexResult};
use crate::indexing::fingerprint::{self, Digest};
use crate::storage::{NewFile, NewFilePart, SimilarityIndexStore};
use crate::types::{FileId, IndexScope, ProgressStatus};
use crate::vector::{EmbeddingError, EmbeddingProvider, codec};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default token budget per chunk.
pub const DEFAULT_MAX_TOKENS_PER_CHUNK: usize = 2048;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Model name handed to the provider and stored on every part.
    pub model: String,
    pub max_tokens_per_chunk: usize,
    /// Re-embed unchanged text when its parts were produced by another model.
    pub match_model: bool,
}

impl IndexerOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens_per_chunk: DEFAULT_MAX_TOKENS_PER_CHUNK,
            match_model: true,
        }
    }
}

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Stored parts are still valid. No provider call was made.
    Skipped,
    /// Parts were (re)embedded and committed.
    Updated { parts: usize },
    /// Cancellation was observed; nothing new was committed.
    Canceled,
}

impl IndexOutcome {
    pub fn status(&self) -> ProgressStatus {
        match self {
            IndexOutcome::Skipped => ProgressStatus::Skipped,
            IndexOutcome::Updated { .. } => ProgressStatus::Updated,
            IndexOutcome::Canceled => ProgressStatus::Canceled,
        }
    }
}

/// Decodes file bytes as UTF-8 text, dropping a leading byte order mark.
pub fn decode_text<'a>(path: &Path, bytes: &'a [u8]) -> IndexResult<&'a str> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|_| IndexError::NotText {
        path: path.to_path_buf(),
    })
}

pub struct IncrementalIndexer<'a, P: ?Sized> {
    provider: &'a P,
    options: &'a IndexerOptions,
}

impl<'a, P: EmbeddingProvider + ?Sized> IncrementalIndexer<'a, P> {
    pub fn new(provider: &'a P, options: &'a IndexerOptions) -> Self {
        Self { provider, options }
    }

    /// Reads `path` from disk and indexes it.
    pub fn index_file<S: SimilarityIndexStore + ?Sized>(
        &self,
        store: &mut S,
        scope: &IndexScope,
        path: &Path,
        cancel: &CancellationToken,
    ) -> IndexResult<IndexOutcome> {
        let bytes = std::fs::read(path).map_err(|source| IndexError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.index_bytes(store, scope, path, &bytes, cancel)
    }

    /// Indexes `bytes` as the current content of `path`.
    pub fn index_bytes<S: SimilarityIndexStore + ?Sized>(
        &self,
        store: &mut S,
        scope: &IndexScope,
        path: &Path,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> IndexResult<IndexOutcome> {
        if cancel.is_cancelled() {
            return Ok(IndexOutcome::Canceled);
        }

        let file_hash = fingerprint::file_hash(bytes);

        let existing = match store.find_file(scope, path)? {
            Some(file) if !file.hash.matches(&file_hash) => {
                debug!("{} changed, dropping file {}", path.display(), file.id);
                store.delete_file(file.id)?;
                None
            }
            other => other,
        };

        let (file_id, is_new) = match existing {
            Some(file) => (file.id, false),
            None => {
                let id = store.insert_file(NewFile::new(
                    scope,
                    path,
                    file_hash,
                    bytes.len() as u64,
                ))?;
                (id, true)
            }
        };

        let text = decode_text(path, bytes)?;
        let chunks = chunking::chunk(text, self.options.max_tokens_per_chunk);
        let digests: Vec<Digest> = chunks
            .iter()
            .map(|chunk| fingerprint::chunk_hash(&chunk.text))
            .collect();

        if !is_new && self.stored_parts_valid(store, file_id, &digests)? {
            store.set_parts_state(file_id, ProgressStatus::Completed)?;
            store.set_file_state(file_id, ProgressStatus::Completed)?;
            debug!("{} unchanged, skipped", path.display());
            return Ok(IndexOutcome::Skipped);
        }

        let Some(vectors) = self.embed(path, &chunks, cancel)? else {
            debug!("{} canceled before commit", path.display());
            return Ok(IndexOutcome::Canceled);
        };

        let count = chunks.len() as u32;
        let parts: Vec<NewFilePart> = chunks
            .into_iter()
            .zip(digests)
            .zip(vectors)
            .enumerate()
            .map(|(index, ((chunk, hash), vector))| NewFilePart {
                index: index as u32,
                count,
                hash,
                embedding_model: self.options.model.clone(),
                embedding_size: vector.len() as u32,
                embedding: codec::encode(&vector),
                text: chunk.text,
                text_tokens: chunk.tokens as u32,
                group_name: scope.group_name.clone(),
                group_flag: scope.group_flag,
                state: ProgressStatus::Completed,
            })
            .collect();

        let committed = store.replace_parts(file_id, parts)?.len();
        store.set_file_state(file_id, ProgressStatus::Completed)?;
        debug!("{} embedded into {committed} parts", path.display());
        Ok(IndexOutcome::Updated { parts: committed })
    }

    fn stored_parts_valid<S: SimilarityIndexStore + ?Sized>(
        &self,
        store: &S,
        file_id: FileId,
        digests: &[Digest],
    ) -> IndexResult<bool> {
        let stored = store.parts_for_file(file_id)?;
        let stored_digests: Vec<Digest> = stored.iter().map(|part| part.hash.clone()).collect();
        if !fingerprint::all_match(&stored_digests, digests) {
            return Ok(false);
        }
        if self.options.match_model {
            return Ok(stored
                .iter()
                .all(|part| part.embedding_model == self.options.model));
        }
        Ok(true)
    }

    /// Embeds every chunk with one provider call. `None` means cancellation
    /// was observed around the call.
    fn embed(
        &self,
        path: &Path,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> IndexResult<Option<Vec<Vec<f32>>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if chunks.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .provider
            .embed(&self.options.model, &texts)
            .map_err(|source| IndexError::Embedding {
                path: path.to_path_buf(),
                source,
            })?;

        if cancel.is_cancelled() {
            return Ok(None);
        }
        if vectors.len() != texts.len() {
            return Err(IndexError::Embedding {
                path: path.to_path_buf(),
                source: EmbeddingError::CountMismatch {
                    expected: texts.len(),
                    actual: vectors.len(),
                },
            });
        }
        Ok(Some(vectors))
    }
}
