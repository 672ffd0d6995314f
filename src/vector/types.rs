//! Core types shared by the codec and the similarity search.

use std::cmp::Ordering;
use thiserror::Error;

/// Cosine similarity score with a total order.
///
/// Construction clamps NaN to the minimal similarity (-1.0), so two scores can
/// always be compared without panicking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score(f32);

impl Score {
    /// Lowest possible similarity. Degenerate vectors score this.
    pub const MIN: Score = Score(-1.0);

    #[must_use]
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            Self::MIN
        } else {
            Self(value.clamp(-1.0, 1.0))
        }
    }

    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Vector dimension with validation against incoming vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error(
        "Invalid vector encoding: {len} bytes is not a multiple of 4\nSuggestion: The stored embedding is corrupted, rescan the file to regenerate it"
    )]
    InvalidEncoding { len: usize },

    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },
}
