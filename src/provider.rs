//! Backend provider contract and its two implementations.
//!
//! [`Backend`] is the uniform operation surface call sites depend on.
//! Backend selection is a pure configuration decision made once at
//! initialization via [`create_backend`] and held for the session:
//! - **[`LocalBackend`]** — the full ingestion pipeline and retrieval
//!   engine backed by SQLite and an OpenAI-compatible API server.
//! - **[`CloudBackend`]** — delegates retrieval entirely to a managed
//!   search service over REST; it contributes no ranking of its own.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::extract;
use crate::llm::{ApiClient, ChatModel, ConnectionProbe, Embedder};
use crate::models::{Answer, DocumentRecord, ScoredSegment, Segment, SourceRef, StoreRecord};
use crate::pipeline::{IndexOutcome, IndexPipeline};
use crate::rank::rank;
use crate::store::{derive_store_id, VectorStore};

/// Canned answer returned by `ask` when no segment clears the relevance
/// floor; inference is never invoked in that case.
pub const NO_MATCH_ANSWER: &str =
    "No relevant documents were found in the project index for this question.";

const ASK_SYSTEM_PROMPT: &str = "You are a documentation assistant. Answer the question using \
only the provided context excerpts. Cite the source paths you relied on. If the context does \
not contain the answer, say so plainly.";

/// The capability set both backend variants implement. Call sites depend
/// only on this surface, never on which variant is active.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Prepare the backend for the session: schema, store record, and a
    /// wholesale cache rebuild. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Whether this path's type is eligible for indexing.
    fn is_supported(&self, path: &Path) -> bool;

    /// Index or re-index one document.
    async fn index(&self, path: &Path) -> Result<IndexOutcome>;

    /// Remove one document. Returns whether a record existed.
    async fn remove(&self, path: &Path) -> Result<bool>;

    /// Rank indexed segments against a natural-language query.
    async fn search(&self, query: &str) -> Result<Vec<ScoredSegment>>;

    /// Answer a question with retrieval-augmented inference.
    async fn ask(&self, question: &str) -> Result<Answer>;

    /// Clear the whole index scope. The caller re-scans afterward.
    async fn reindex_all(&self) -> Result<()>;

    async fn store_info(&self) -> Result<StoreRecord>;

    async fn indexed_files(&self) -> Result<Vec<DocumentRecord>>;

    /// Probe the backing service. `Ok(true)` means reachable.
    async fn test_connection(&self) -> Result<bool>;

    /// Release resources at session end.
    async fn dispose(&self) -> Result<()>;
}

/// Select and construct the backend once, from configuration.
pub async fn create_backend(config: &Config) -> Result<Box<dyn Backend>> {
    match config.backend.provider.as_str() {
        "local" => Ok(Box::new(LocalBackend::from_config(config).await?)),
        "cloud" => Ok(Box::new(CloudBackend::new(config)?)),
        other => Err(IndexError::Config(format!(
            "unknown backend provider: '{}'",
            other
        ))),
    }
}

// ============ Local backend ============

/// Self-hosted backend: local SQLite vector store, linear-scan cosine
/// ranking, embeddings and inference via an OpenAI-compatible server.
pub struct LocalBackend {
    store: Arc<VectorStore>,
    pipeline: IndexPipeline,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    probe: Arc<dyn ConnectionProbe>,
}

impl LocalBackend {
    pub async fn from_config(config: &Config) -> Result<Self> {
        let client = Arc::new(ApiClient::new(&config.api)?);
        let store = Arc::new(
            VectorStore::open(
                &config.db.path,
                &config.project.root,
                &config.project.display_name(),
            )
            .await?,
        );
        Ok(Self::with_clients(
            store,
            client.clone(),
            client.clone(),
            client,
            config,
        ))
    }

    /// Assemble a backend from explicit collaborators. This is the seam
    /// used to run the engine against stub clients.
    pub fn with_clients(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        probe: Arc<dyn ConnectionProbe>,
        config: &Config,
    ) -> Self {
        let pipeline = IndexPipeline::new(
            store.clone(),
            embedder.clone(),
            config.chunking.clone(),
            config.project.root.clone(),
        );
        Self {
            store,
            pipeline,
            embedder,
            chat,
            probe,
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn initialize(&self) -> Result<()> {
        let skipped = self.store.load_all().await?;
        if skipped > 0 {
            warn!(skipped, "excluded segments with malformed vectors from the cache");
        }
        self.store.refresh_store_count().await?;
        Ok(())
    }

    fn is_supported(&self, path: &Path) -> bool {
        extract::is_supported(path)
    }

    async fn index(&self, path: &Path) -> Result<IndexOutcome> {
        self.pipeline.index_file(path).await
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        self.pipeline.remove_file(path).await
    }

    async fn search(&self, query: &str) -> Result<Vec<ScoredSegment>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        // One code path for "text → vector": queries embed exactly like
        // document segments.
        let query_vec = self.embedder.embed(query).await?;

        let hits = {
            let cache = self.store.cache();
            rank(&query_vec, &cache)
        };
        Ok(hits)
    }

    async fn ask(&self, question: &str) -> Result<Answer> {
        let hits = self.search(question).await?;

        if hits.is_empty() {
            return Ok(Answer {
                text: NO_MATCH_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let user_prompt = compose_ask_prompt(question, &hits);
        let text = self.chat.complete(ASK_SYSTEM_PROMPT, &user_prompt).await?;

        Ok(Answer {
            text,
            sources: collect_sources(&hits),
        })
    }

    async fn reindex_all(&self) -> Result<()> {
        self.pipeline.clear().await
    }

    async fn store_info(&self) -> Result<StoreRecord> {
        self.store.store_record().await
    }

    async fn indexed_files(&self) -> Result<Vec<DocumentRecord>> {
        self.store.documents().await
    }

    async fn test_connection(&self) -> Result<bool> {
        self.probe.probe().await
    }

    async fn dispose(&self) -> Result<()> {
        self.store.close().await;
        Ok(())
    }
}

/// Stitch ranked excerpts into the retrieval-augmented user prompt.
fn compose_ask_prompt(question: &str, hits: &[ScoredSegment]) -> String {
    let mut prompt = String::from("Context excerpts:\n\n");
    for (i, hit) in hits.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] (source: {})\n{}\n\n",
            i + 1,
            hit.segment.rel_path,
            hit.segment.text
        ));
    }
    prompt.push_str(&format!("Question: {}", question));
    prompt
}

/// Deduplicate hit paths into source attributions, best score first.
fn collect_sources(hits: &[ScoredSegment]) -> Vec<SourceRef> {
    let mut seen = std::collections::HashSet::new();
    hits.iter()
        .filter(|hit| seen.insert(hit.segment.rel_path.clone()))
        .map(|hit| SourceRef {
            rel_path: hit.segment.rel_path.clone(),
            relevance_percent: hit.relevance_percent(),
        })
        .collect()
}

// ============ Cloud backend ============

/// Managed-service backend. Every operation delegates to the cloud
/// provider's REST API; document content is uploaded whole and the
/// service performs its own chunking, embedding, and ranking. Remote
/// document handles land in `content_ref`.
pub struct CloudBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    store_id: String,
    project_name: String,
    root: PathBuf,
}

impl CloudBackend {
    pub fn new(config: &Config) -> Result<Self> {
        if config.cloud.base_url.is_empty() {
            return Err(IndexError::Config(
                "cloud.base_url is required for the cloud backend".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.api.timeout_secs))
            .build()
            .map_err(|e| IndexError::Cloud(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.cloud.base_url.trim_end_matches('/').to_string(),
            api_key: config.cloud.api_key.clone(),
            store_id: derive_store_id(&config.project.root),
            project_name: config.project.display_name(),
            root: config.project.root.clone(),
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/stores/{}{}", self.base_url, self.store_id, suffix)
    }

    async fn post_json(&self, url: String, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Cloud(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(IndexError::Cloud(format!(
                "cloud API error {}: {}",
                status, body_text
            )));
        }

        resp.json().await.map_err(|e| IndexError::Cloud(e.to_string()))
    }

    async fn get_json(&self, url: String) -> Result<serde_json::Value> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| IndexError::Cloud(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(IndexError::Cloud(format!(
                "cloud API error {}: {}",
                status, body_text
            )));
        }

        resp.json().await.map_err(|e| IndexError::Cloud(e.to_string()))
    }
}

#[async_trait]
impl Backend for CloudBackend {
    async fn initialize(&self) -> Result<()> {
        let body = serde_json::json!({
            "id": self.store_id,
            "label": format!("{} index", self.project_name),
            "project_name": self.project_name,
            "root_path": self.root.to_string_lossy().replace('\\', "/"),
        });
        self.post_json(format!("{}/stores", self.base_url), body)
            .await?;
        Ok(())
    }

    fn is_supported(&self, path: &Path) -> bool {
        extract::is_supported(path)
    }

    async fn index(&self, path: &Path) -> Result<IndexOutcome> {
        if !extract::is_supported(path) {
            return Ok(IndexOutcome::Unsupported);
        }

        let text = extract::extract_text(path)?;
        if text.trim().is_empty() {
            return Ok(IndexOutcome::Empty);
        }

        let rel_path = extract::relative_path(path, &self.root);
        let body = serde_json::json!({
            "path": rel_path,
            "name": path.file_name().map(|n| n.to_string_lossy().to_string()),
            "media_type": extract::media_type(path),
            "content": text,
        });

        let json = self.post_json(self.url("/documents"), body).await?;
        let segments = json
            .get("segments")
            .and_then(|s| s.as_u64())
            .unwrap_or(0) as usize;

        Ok(IndexOutcome::Indexed { segments })
    }

    async fn remove(&self, path: &Path) -> Result<bool> {
        let rel_path = extract::relative_path(path, &self.root);
        let resp = self
            .http
            .delete(self.url("/documents"))
            .bearer_auth(&self.api_key)
            .query(&[("path", rel_path.as_str())])
            .send()
            .await
            .map_err(|e| IndexError::Cloud(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => {
                let body_text = resp.text().await.unwrap_or_default();
                Err(IndexError::Cloud(format!(
                    "cloud API error {}: {}",
                    s, body_text
                )))
            }
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<ScoredSegment>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({ "query": query, "limit": crate::rank::TOP_K });
        let json = self.post_json(self.url("/search"), body).await?;

        let results = json
            .get("results")
            .and_then(|r| r.as_array())
            .ok_or_else(|| IndexError::Cloud("invalid search response: missing results".into()))?;

        let mut hits = Vec::with_capacity(results.len());
        for item in results {
            hits.push(ScoredSegment {
                segment: Segment {
                    id: item
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    rel_path: item
                        .get("path")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    seq: item.get("seq").and_then(|v| v.as_i64()).unwrap_or(0),
                    text: item
                        .get("text")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    embedding: Vec::new(),
                    created_at: 0,
                },
                score: item
                    .get("score")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0) as f32,
            });
        }
        Ok(hits)
    }

    async fn ask(&self, question: &str) -> Result<Answer> {
        let body = serde_json::json!({ "question": question });
        let json = self.post_json(self.url("/answer"), body).await?;

        let text = json
            .get("answer")
            .and_then(|a| a.as_str())
            .ok_or_else(|| IndexError::Inference("invalid answer response: missing answer".into()))?
            .to_string();

        let sources = json
            .get("sources")
            .and_then(|s| s.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(SourceRef {
                            rel_path: item.get("path")?.as_str()?.to_string(),
                            relevance_percent: item
                                .get("relevance")
                                .and_then(|r| r.as_f64())
                                .unwrap_or(0.0) as f32,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Answer { text, sources })
    }

    async fn reindex_all(&self) -> Result<()> {
        self.post_json(self.url("/reindex"), serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn store_info(&self) -> Result<StoreRecord> {
        let json = self.get_json(self.url("")).await?;
        Ok(StoreRecord {
            id: self.store_id.clone(),
            label: json
                .get("label")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            project_name: self.project_name.clone(),
            root_path: self.root.to_string_lossy().replace('\\', "/"),
            created_at: json.get("created_at").and_then(|v| v.as_i64()).unwrap_or(0),
            last_synced_at: json
                .get("last_synced_at")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            document_count: json
                .get("document_count")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
        })
    }

    async fn indexed_files(&self) -> Result<Vec<DocumentRecord>> {
        let json = self.get_json(self.url("/documents")).await?;
        let items = json
            .get("documents")
            .and_then(|d| d.as_array())
            .ok_or_else(|| {
                IndexError::Cloud("invalid documents response: missing documents".into())
            })?;

        let mut docs = Vec::with_capacity(items.len());
        for item in items {
            docs.push(DocumentRecord {
                id: item
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                store_id: self.store_id.clone(),
                rel_path: item
                    .get("path")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                name: item
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                size_bytes: item.get("size").and_then(|v| v.as_i64()).unwrap_or(0),
                media_type: item
                    .get("media_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("text/plain")
                    .to_string(),
                indexed_at: item.get("indexed_at").and_then(|v| v.as_i64()).unwrap_or(0),
                content_ref: item
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(docs)
    }

    async fn test_connection(&self) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| IndexError::Cloud(e.to_string()))?;
        Ok(resp.status().is_success())
    }

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}
