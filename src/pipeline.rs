//! Indexing pipeline: extraction → chunking → embedding → persistence.
//!
//! One document at a time, all-or-nothing. Chunks are embedded strictly
//! in ordinal order with one sequential call each; any failure aborts
//! the document's index attempt with nothing written, leaving a prior
//! index for that path untouched. A per-path in-flight marker drops
//! duplicate requests (a rapid create-then-change pair must not race two
//! pipelines against the same document).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::extract;
use crate::llm::Embedder;
use crate::models::{DocumentRecord, Segment, LOCAL_CONTENT_REF};
use crate::store::VectorStore;

/// Terminal state of one document's index attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Extension not in the allow-list. No side effect.
    Unsupported,
    /// Extracted text was empty after normalization. Nothing written.
    Empty,
    /// A prior index attempt for the same path is still in flight; this
    /// request was dropped, not queued.
    Skipped,
    /// All chunks embedded and persisted.
    Indexed { segments: usize },
}

pub struct IndexPipeline {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    root: PathBuf,
    in_flight: Mutex<HashSet<String>>,
}

impl IndexPipeline {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        root: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            chunking,
            root,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Index or re-index a single file. Re-running for an already-indexed
    /// path tears down its prior segments before inserting the new ones,
    /// so stale chunks cannot linger when the document shrinks.
    pub async fn index_file(&self, path: &Path) -> Result<IndexOutcome> {
        let rel_path = extract::relative_path(path, &self.root);

        let _guard = match InFlightGuard::acquire(&self.in_flight, &rel_path) {
            Some(guard) => guard,
            None => {
                debug!(path = %rel_path, "dropping duplicate index request already in flight");
                return Ok(IndexOutcome::Skipped);
            }
        };

        if !extract::is_supported(path) {
            return Ok(IndexOutcome::Unsupported);
        }

        let text = extract::extract_text(path)?;
        if text.trim().is_empty() {
            debug!(path = %rel_path, "skipping empty document");
            return Ok(IndexOutcome::Empty);
        }

        let chunks = chunk_text(&text, self.chunking.target_size, self.chunking.overlap);
        if chunks.is_empty() {
            return Ok(IndexOutcome::Empty);
        }

        // Chunk i's vector is requested and awaited before chunk i+1's,
        // so ordinal-to-vector correspondence holds on write. A failed
        // chunk aborts the whole document with nothing written.
        let now = chrono::Utc::now().timestamp();
        let mut segments = Vec::with_capacity(chunks.len());
        for (seq, chunk) in chunks.iter().enumerate() {
            let embedding = self.embedder.embed(chunk).await?;
            segments.push(Segment {
                id: Uuid::new_v4().to_string(),
                rel_path: rel_path.clone(),
                seq: seq as i64,
                text: chunk.clone(),
                embedding,
                created_at: now,
            });
        }

        let metadata = std::fs::metadata(path)?;
        let doc = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            store_id: self.store.store_id().to_string(),
            rel_path: rel_path.clone(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| rel_path.clone()),
            size_bytes: metadata.len() as i64,
            media_type: extract::media_type(path).to_string(),
            indexed_at: now,
            content_ref: LOCAL_CONTENT_REF.to_string(),
        };

        let count = segments.len();
        self.store.upsert_document(&doc, &segments).await?;
        info!(
            path = %rel_path,
            segments = count,
            model = self.embedder.model_name(),
            "indexed document"
        );

        Ok(IndexOutcome::Indexed { segments: count })
    }

    /// Remove a document's persisted rows and cache entry. Removing a
    /// never-indexed path is a no-op. Returns whether a record existed.
    pub async fn remove_file(&self, path: &Path) -> Result<bool> {
        let rel_path = extract::relative_path(path, &self.root);
        let existed = self.store.delete_document(&rel_path).await?;
        if existed {
            info!(path = %rel_path, "removed document from index");
        }
        Ok(existed)
    }

    /// Drop every durable row and cache entry for the store scope and
    /// recreate the store record. The caller triggers a fresh directory
    /// scan afterward; the pipeline does not re-discover files.
    pub async fn clear(&self) -> Result<()> {
        self.store.clear_all().await?;
        info!("cleared index for full re-index");
        Ok(())
    }
}

/// Removes the path from the in-flight set when the attempt finishes,
/// including on error paths.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    rel_path: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, rel_path: &str) -> Option<Self> {
        let mut in_flight = set.lock().expect("in-flight lock poisoned");
        if !in_flight.insert(rel_path.to_string()) {
            return None;
        }
        Some(Self {
            set,
            rel_path: rel_path.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.rel_path);
    }
}
