//! Bounded top-K cosine similarity selection.
//!
//! Candidates stream through a min-heap holding at most `k` entries, so memory
//! stays O(k) for any candidate count. The result is identical to scoring every
//! candidate, sorting by (score desc, id asc) and taking the first `k`.

use super::types::Score;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Cosine similarity between two vectors.
///
/// Empty or zero-magnitude vectors, mismatched dimensions and non-finite
/// results all yield [`Score::MIN`].
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Score {
    if a.len() != b.len() || a.is_empty() {
        return Score::MIN;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Score::MIN;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        Score::new(similarity as f32)
    } else {
        Score::MIN
    }
}

#[derive(Debug, Clone)]
struct Ranked<Id> {
    score: Score,
    id: Id,
}

impl<Id: Ord> PartialEq for Ranked<Id> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<Id: Ord> Eq for Ranked<Id> {}

impl<Id: Ord> PartialOrd for Ranked<Id> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Id: Ord> Ord for Ranked<Id> {
    // Greater means better: higher score, then lower id.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Incremental top-K accumulator.
///
/// ```
/// use semdex::vector::TopK;
///
/// let mut top = TopK::new(&[1.0, 0.0], 1);
/// top.push(7, &[0.0, 1.0]);
/// top.push(3, &[1.0, 0.1]);
/// assert_eq!(top.into_ranked(), vec![3]);
/// ```
#[derive(Debug)]
pub struct TopK<'q, Id> {
    query: &'q [f32],
    k: usize,
    heap: BinaryHeap<Reverse<Ranked<Id>>>,
}

impl<'q, Id: Ord> TopK<'q, Id> {
    pub fn new(query: &'q [f32], k: usize) -> Self {
        Self {
            query,
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    /// Scores one candidate and keeps it if it ranks among the best `k`.
    pub fn push(&mut self, id: Id, vector: &[f32]) {
        if self.k == 0 {
            return;
        }
        let candidate = Ranked {
            score: cosine_similarity(self.query, vector),
            id,
        };

        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return;
        }

        let replaces_worst = self
            .heap
            .peek()
            .is_some_and(|Reverse(worst)| candidate > *worst);
        if replaces_worst {
            self.heap.pop();
            self.heap.push(Reverse(candidate));
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Ranked ids with their scores, best first.
    pub fn into_scored(self) -> Vec<(Id, Score)> {
        // Ascending over `Reverse` is descending over rank.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(ranked)| (ranked.id, ranked.score))
            .collect()
    }

    /// Ranked ids, best first.
    pub fn into_ranked(self) -> Vec<Id> {
        self.into_scored().into_iter().map(|(id, _)| id).collect()
    }
}

/// Returns the ids of the `k` candidates most similar to `query`.
pub fn search<Id, V, I>(candidates: I, query: &[f32], k: usize) -> Vec<Id>
where
    Id: Ord,
    V: AsRef<[f32]>,
    I: IntoIterator<Item = (Id, V)>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut top = TopK::new(query, k);
    for (id, vector) in candidates {
        top.push(id, vector.as_ref());
    }
    top.into_ranked()
}
