//! Cosine-similarity ranking over the in-memory vector cache.
//!
//! Pure in-memory computation: no suspension points. The corpus sizes
//! this crate targets are serviceable by a linear scan over every cached
//! segment vector; there is no approximate-nearest-neighbor structure.

use std::collections::HashMap;

use crate::models::{ScoredSegment, Segment};

/// Results at or below this similarity are discarded.
pub const RELEVANCE_FLOOR: f32 = 0.3;

/// Maximum number of ranked results returned.
pub const TOP_K: usize = 10;

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Score `query` against every cached segment vector and return the top
/// matches, descending by similarity, strictly above [`RELEVANCE_FLOOR`]
/// and truncated to [`TOP_K`]. Tie order is unspecified.
///
/// An empty cache yields an empty vec, not an error.
pub fn rank(query: &[f32], cache: &HashMap<String, Vec<Segment>>) -> Vec<ScoredSegment> {
    // Score before cloning so only segments that clear the floor pay
    // for copying their text and vector.
    let mut scored: Vec<ScoredSegment> = cache
        .values()
        .flatten()
        .filter_map(|segment| {
            let score = cosine_similarity(query, &segment.embedding);
            (score > RELEVANCE_FLOOR).then(|| ScoredSegment {
                segment: segment.clone(),
                score,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(TOP_K);

    scored
}
