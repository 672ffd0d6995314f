//! Embedding provider port and the local fastembed implementation.
//!
//! The indexer never talks to a model directly. It hands chunk texts to an
//! [`EmbeddingProvider`] and gets one vector back per text, in input order.
//! Remote API clients live outside this crate and plug in through the same
//! trait.

use crate::vector::VectorDimension;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model '{model}': {reason}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit { model: String, reason: String },

    #[error(
        "Unknown embedding model '{0}'\nSuggestion: Use one of: {known}",
        known = SUPPORTED_MODELS.join(", ")
    )]
    UnknownModel(String),

    #[error("Embedding generation failed: {0}")]
    Generation(String),

    #[error("Provider returned {actual} embeddings for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Embedding provider is unavailable: {0}")]
    Unavailable(String),
}

/// Port to whatever service turns text into vectors.
///
/// Implementations must be thread-safe and must return exactly one vector per
/// input text, in input order.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds `texts` with the named model.
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for std::sync::Arc<P> {
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed(model, texts)
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for &P {
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed(model, texts)
    }
}

/// Model names accepted by [`parse_embedding_model`].
pub const SUPPORTED_MODELS: &[&str] = &[
    "AllMiniLML6V2",
    "AllMiniLML12V2",
    "BGESmallENV15",
    "BGEBaseENV15",
    "NomicEmbedTextV15",
    "MultilingualE5Small",
];

/// Resolves a configured model name to a fastembed model and its dimension.
pub fn parse_embedding_model(
    name: &str,
) -> Result<(EmbeddingModel, VectorDimension), EmbeddingError> {
    let (model, dim) = match name {
        "AllMiniLML6V2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "AllMiniLML12V2" => (EmbeddingModel::AllMiniLML12V2, 384),
        "BGESmallENV15" => (EmbeddingModel::BGESmallENV15, 384),
        "BGEBaseENV15" => (EmbeddingModel::BGEBaseENV15, 768),
        "NomicEmbedTextV15" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "MultilingualE5Small" => (EmbeddingModel::MultilingualE5Small, 384),
        other => return Err(EmbeddingError::UnknownModel(other.to_string())),
    };
    let dimension =
        VectorDimension::new(dim).map_err(|e| EmbeddingError::Generation(e.to_string()))?;
    Ok((model, dimension))
}

/// Local embedding provider backed by fastembed's ONNX models.
///
/// One model is loaded per provider. Requests naming any other model fail, so
/// a configuration change never silently mixes vector spaces.
pub struct FastEmbedProvider {
    model_name: String,
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedProvider {
    /// Loads (downloading on first use) the named model into `cache_dir`.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        show_download_progress: bool,
    ) -> Result<Self, EmbeddingError> {
        let (model, dimension) = parse_embedding_model(model_name)?;
        let model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| EmbeddingError::ModelInit {
            model: model_name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            model_name: model_name.to_string(),
            model: Mutex::new(model),
            dimension,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if model != self.model_name {
            return Err(EmbeddingError::Unavailable(format!(
                "provider is loaded with '{}', not '{model}'",
                self.model_name
            )));
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                EmbeddingError::Generation(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Generation(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }
        for embedding in &embeddings {
            self.dimension
                .validate_vector(embedding)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))?;
        }

        Ok(embeddings)
    }
}

/// Deterministic provider for unit tests.
///
/// Vectors are derived from the text bytes, so equal texts embed equally and
/// different texts almost always differ. Every call is counted.
#[cfg(test)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    calls: std::sync::atomic::AtomicUsize,
    fail: bool,
}

#[cfg(test)]
impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: std::sync::atomic::AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(4)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::Unavailable("mock outage".to_string()));
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.1f32; self.dimension];
                for (i, byte) in text.bytes().enumerate() {
                    vector[i % self.dimension] += f32::from(byte) / 255.0;
                }
                vector
            })
            .collect())
    }
}
