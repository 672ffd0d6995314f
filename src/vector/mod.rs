//! Vector encoding, embedding providers and similarity search.
//!
//! # Storage format
//! Embeddings are persisted as raw little-endian f32 bytes (see [`codec`]).
//!
//! # Search
//! Queries stream every candidate through a bounded top-K heap. There is no
//! approximate index; results are exact cosine rankings.

pub mod codec;
mod embedding;
mod search;
mod types;

#[cfg(test)]
pub use embedding::MockEmbeddingProvider;
pub use embedding::{
    EmbeddingError, EmbeddingProvider, FastEmbedProvider, SUPPORTED_MODELS, parse_embedding_model,
};
pub use search::{TopK, cosine_similarity, search};
pub use types::{Score, VectorDimension, VectorError};
