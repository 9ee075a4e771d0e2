//! Core data models used throughout docdex.
//!
//! These types represent the segments, documents, and stores that flow
//! through the indexing pipeline and the retrieval engine.

use serde::Serialize;

/// Content reference marker for documents held by the local backend.
pub const LOCAL_CONTENT_REF: &str = "local";

/// One contiguous slice of a document's normalized text, with its
/// embedding vector.
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: String,
    /// Owning document's relative path, forward-slash normalized.
    pub rel_path: String,
    /// Zero-based ordinal within the document snapshot. Contiguous from 0.
    pub seq: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: i64,
}

/// Metadata about one indexed file. At most one live record per
/// (relative path, store) pair; a re-index replaces the whole row.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub store_id: String,
    pub rel_path: String,
    pub name: String,
    pub size_bytes: i64,
    pub media_type: String,
    pub indexed_at: i64,
    /// `"local"` for the local backend; a remote handle for the cloud one.
    pub content_ref: String,
}

/// One logical index scope bound to a project root.
#[derive(Debug, Clone, Serialize)]
pub struct StoreRecord {
    /// Derived deterministically from the project root, not random, so
    /// re-opening the same project resolves the same store.
    pub id: String,
    pub label: String,
    pub project_name: String,
    pub root_path: String,
    pub created_at: i64,
    pub last_synced_at: i64,
    /// Derived cache of the document-record count; recomputed after
    /// every mutation.
    pub document_count: i64,
}

/// A segment paired with its cosine similarity against a query.
#[derive(Debug, Clone)]
pub struct ScoredSegment {
    pub segment: Segment,
    /// Raw cosine similarity, used for ranking.
    pub score: f32,
}

impl ScoredSegment {
    /// Relevance on a 0–100 scale, for display only.
    pub fn relevance_percent(&self) -> f32 {
        self.score * 100.0
    }
}

/// Source attribution attached to an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub rel_path: String,
    pub relevance_percent: f32,
}

/// Answer to a natural-language question with source attributions.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}
