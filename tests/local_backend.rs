//! End-to-end exercises of the local backend through the public backend
//! contract, with the HTTP clients replaced by deterministic stubs.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use docdex::config::Config;
use docdex::error::Result;
use docdex::llm::{ChatModel, ConnectionProbe, Embedder};
use docdex::pipeline::IndexOutcome;
use docdex::provider::{Backend, LocalBackend, NO_MATCH_ANSWER};
use docdex::store::VectorStore;

/// Keyword-presence embedder: the vector marks which topic words appear,
/// so topically matching texts score near 1.0 under cosine similarity
/// and unrelated texts fall below the relevance floor.
struct TopicEmbedder {
    calls: AtomicUsize,
}

impl TopicEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lower = text.to_lowercase();
        let deploy = if lower.contains("deploy") { 1.0 } else { 0.0 };
        let cooking = if lower.contains("recipe") { 1.0 } else { 0.0 };
        Ok(vec![deploy, cooking, 0.1])
    }

    fn model_name(&self) -> &str {
        "topic-stub"
    }
}

/// Records invocations so tests can assert inference was (not) called.
struct RecordingChat {
    calls: AtomicUsize,
}

impl RecordingChat {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("answer based on {} chars of context", user.len()))
    }
}

struct AlwaysUp;

#[async_trait]
impl ConnectionProbe for AlwaysUp {
    async fn probe(&self) -> Result<bool> {
        Ok(true)
    }
}

struct Harness {
    _tmp: TempDir,
    root: PathBuf,
    backend: LocalBackend,
    embedder: Arc<TopicEmbedder>,
    chat: Arc<RecordingChat>,
}

fn test_config(root: &Path, db: &Path) -> Config {
    let toml = format!(
        r#"
        [db]
        path = "{}"

        [project]
        root = "{}"

        [chunking]
        target_size = 80
        overlap = 20
        "#,
        db.display(),
        root.display()
    );
    toml::from_str(&toml).unwrap()
}

async fn setup() -> Harness {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("project");
    std::fs::create_dir_all(&root).unwrap();
    let db = tmp.path().join("docdex.sqlite");

    let config = test_config(&root, &db);
    let store = Arc::new(
        VectorStore::open(&db, &root, "project").await.unwrap(),
    );
    let embedder = Arc::new(TopicEmbedder::new());
    let chat = Arc::new(RecordingChat::new());
    let backend = LocalBackend::with_clients(
        store,
        embedder.clone(),
        chat.clone(),
        Arc::new(AlwaysUp),
        &config,
    );
    backend.initialize().await.unwrap();

    Harness {
        _tmp: tmp,
        root,
        backend,
        embedder,
        chat,
    }
}

fn write_doc(root: &Path, name: &str, content: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn search_retrieves_the_topically_relevant_document() {
    let h = setup().await;
    let deploy = write_doc(&h.root, "deploy.md", "How to deploy the service to production.");
    let recipes = write_doc(&h.root, "recipes.md", "A recipe for sourdough bread.");

    h.backend.index(&deploy).await.unwrap();
    h.backend.index(&recipes).await.unwrap();

    let hits = h.backend.search("how do I deploy?").await.unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].segment.rel_path, "deploy.md");
    assert!(hits.iter().all(|hit| hit.segment.rel_path != "recipes.md"));
    assert!(hits[0].relevance_percent() > 30.0);
}

#[tokio::test]
async fn reindexing_a_file_is_idempotent() {
    let h = setup().await;
    let path = write_doc(&h.root, "deploy.md", "Deploy notes. Deploy more notes.");

    let first = h.backend.index(&path).await.unwrap();
    let second = h.backend.index(&path).await.unwrap();
    assert_eq!(first, second);

    let files = h.backend.indexed_files().await.unwrap();
    assert_eq!(files.len(), 1);

    let info = h.backend.store_info().await.unwrap();
    assert_eq!(info.document_count, 1);
}

#[tokio::test]
async fn shrinking_document_leaves_no_stale_chunks() {
    let h = setup().await;
    let long = "deploy ".repeat(60);
    let path = write_doc(&h.root, "deploy.md", &long);

    let first = h.backend.index(&path).await.unwrap();
    let IndexOutcome::Indexed { segments: before } = first else {
        panic!("expected indexed outcome");
    };
    assert!(before > 1);

    write_doc(&h.root, "deploy.md", "deploy once");
    let second = h.backend.index(&path).await.unwrap();
    assert_eq!(second, IndexOutcome::Indexed { segments: 1 });

    // Every surviving hit carries the new content only.
    let hits = h.backend.search("deploy").await.unwrap();
    assert!(hits.iter().all(|hit| hit.segment.text == "deploy once"));
}

#[tokio::test]
async fn cache_survives_reopen_with_vectors_intact() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("project");
    std::fs::create_dir_all(&root).unwrap();
    let db = tmp.path().join("docdex.sqlite");
    let config = test_config(&root, &db);

    let path = root.join("deploy.md");
    std::fs::write(&path, "Deploy the service.").unwrap();

    {
        let store = Arc::new(VectorStore::open(&db, &root, "project").await.unwrap());
        let backend = LocalBackend::with_clients(
            store,
            Arc::new(TopicEmbedder::new()),
            Arc::new(RecordingChat::new()),
            Arc::new(AlwaysUp),
            &config,
        );
        backend.initialize().await.unwrap();
        backend.index(&path).await.unwrap();
        backend.dispose().await.unwrap();
    }

    // A fresh session rebuilds the cache from durable rows; ranking
    // works without re-embedding any document.
    let store = Arc::new(VectorStore::open(&db, &root, "project").await.unwrap());
    let embedder = Arc::new(TopicEmbedder::new());
    let backend = LocalBackend::with_clients(
        store,
        embedder.clone(),
        Arc::new(RecordingChat::new()),
        Arc::new(AlwaysUp),
        &config,
    );
    backend.initialize().await.unwrap();

    let hits = backend.search("deploy").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].segment.rel_path, "deploy.md");
    // Only the query itself was embedded this session.
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ask_grounds_the_answer_and_cites_sources() {
    let h = setup().await;
    let path = write_doc(&h.root, "deploy.md", "Deploy with the release script.");
    h.backend.index(&path).await.unwrap();

    let answer = h.backend.ask("how do we deploy?").await.unwrap();
    assert!(answer.text.starts_with("answer based on"));
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].rel_path, "deploy.md");
    assert_eq!(h.chat.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ask_without_relevant_documents_skips_inference() {
    let h = setup().await;
    let path = write_doc(&h.root, "recipes.md", "A recipe for sourdough bread.");
    h.backend.index(&path).await.unwrap();

    let answer = h.backend.ask("what is the meaning of life?").await.unwrap();
    assert_eq!(answer.text, NO_MATCH_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(h.chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn removal_cleans_up_and_decrements_the_count() {
    let h = setup().await;
    let deploy = write_doc(&h.root, "deploy.md", "Deploy the service.");
    let recipes = write_doc(&h.root, "recipes.md", "A recipe for bread.");
    h.backend.index(&deploy).await.unwrap();
    h.backend.index(&recipes).await.unwrap();
    assert_eq!(h.backend.store_info().await.unwrap().document_count, 2);

    assert!(h.backend.remove(&deploy).await.unwrap());
    assert_eq!(h.backend.store_info().await.unwrap().document_count, 1);
    assert!(h.backend.search("deploy").await.unwrap().is_empty());

    // Removing again is a no-op.
    assert!(!h.backend.remove(&deploy).await.unwrap());
}

#[tokio::test]
async fn reindex_all_clears_the_store_scope() {
    let h = setup().await;
    let path = write_doc(&h.root, "deploy.md", "Deploy the service.");
    h.backend.index(&path).await.unwrap();

    h.backend.reindex_all().await.unwrap();
    assert_eq!(h.backend.store_info().await.unwrap().document_count, 0);
    assert!(h.backend.indexed_files().await.unwrap().is_empty());
    assert!(h.backend.search("deploy").await.unwrap().is_empty());
}

#[tokio::test]
async fn unsupported_and_empty_files_do_not_enter_the_index() {
    let h = setup().await;
    let image = write_doc(&h.root, "logo.png", "binary-ish");
    let blank = write_doc(&h.root, "blank.md", "   \n");

    assert_eq!(
        h.backend.index(&image).await.unwrap(),
        IndexOutcome::Unsupported
    );
    assert_eq!(h.backend.index(&blank).await.unwrap(), IndexOutcome::Empty);
    assert!(h.backend.indexed_files().await.unwrap().is_empty());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connection_probe_passes_through() {
    let h = setup().await;
    assert!(h.backend.test_connection().await.unwrap());
}
