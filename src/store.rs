//! Durable vector storage and the in-memory segment cache.
//!
//! Three tables: `stores` (one row per project root), `documents` (one
//! row per indexed file), and `segments` (one row per chunk, carrying
//! its vector serialized as a JSON array). The cache mirrors `segments`
//! keyed by relative path and is what query-time ranking reads; SQLite
//! stays authoritative, so every mutation writes durably first and the
//! cache is rebuilt wholesale at initialization.

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard};
use tracing::warn;

use crate::error::Result;
use crate::models::{DocumentRecord, Segment, StoreRecord, LOCAL_CONTENT_REF};

/// Derive the store identifier from a project root. Deterministic, so
/// re-opening the same project resolves the same store.
pub fn derive_store_id(root: &Path) -> String {
    let normalized = root.to_string_lossy().replace('\\', "/");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Open the SQLite pool, creating the file and parent directory if needed.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(sqlx::Error::from)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Durable table of segments plus the in-memory mirror for one store.
pub struct VectorStore {
    pool: SqlitePool,
    store_id: String,
    root_path: String,
    project_name: String,
    cache: RwLock<HashMap<String, Vec<Segment>>>,
}

impl VectorStore {
    /// Open the store for a project root: connect, migrate the schema,
    /// ensure the store record exists, and rebuild the cache.
    pub async fn open(db_path: &Path, root: &Path, project_name: &str) -> Result<Self> {
        let pool = connect(db_path).await?;
        let store = Self {
            pool,
            store_id: derive_store_id(root),
            root_path: root.to_string_lossy().replace('\\', "/"),
            project_name: project_name.to_string(),
            cache: RwLock::new(HashMap::new()),
        };
        store.ensure_schema().await?;
        store.ensure_store_record().await?;
        store.load_all().await?;
        Ok(store)
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Read access to the in-memory mirror. No `.await` may happen while
    /// the guard is held.
    pub fn cache(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<Segment>>> {
        self.cache.read().expect("cache lock poisoned")
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stores (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                project_name TEXT NOT NULL,
                root_path TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_synced_at INTEGER NOT NULL,
                document_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                store_id TEXT NOT NULL,
                rel_path TEXT NOT NULL,
                name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                media_type TEXT NOT NULL DEFAULT 'text/plain',
                indexed_at INTEGER NOT NULL,
                content_ref TEXT NOT NULL,
                UNIQUE(store_id, rel_path),
                FOREIGN KEY (store_id) REFERENCES stores(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS segments (
                id TEXT PRIMARY KEY,
                store_id TEXT NOT NULL,
                rel_path TEXT NOT NULL,
                seq INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(store_id, rel_path, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_segments_store_path ON segments(store_id, rel_path)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_store ON documents(store_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Create the store record on first open; keep the original creation
    /// time on re-open.
    async fn ensure_store_record(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO stores (id, label, project_name, root_path, created_at, last_synced_at, document_count)
            VALUES (?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                project_name = excluded.project_name,
                root_path = excluded.root_path
            "#,
        )
        .bind(&self.store_id)
        .bind(format!("{} index", self.project_name))
        .bind(&self.project_name)
        .bind(&self.root_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace all prior segments and the document record for this path
    /// in a single transaction, then update the cache, then refresh the
    /// store count. A reader never observes stale segments alongside a
    /// replaced record.
    pub async fn upsert_document(
        &self,
        doc: &DocumentRecord,
        segments: &[Segment],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segments WHERE store_id = ? AND rel_path = ?")
            .bind(&self.store_id)
            .bind(&doc.rel_path)
            .execute(&mut *tx)
            .await?;

        for segment in segments {
            let payload = serde_json::to_string(&segment.embedding)
                .unwrap_or_else(|_| "[]".to_string());
            sqlx::query(
                r#"
                INSERT INTO segments (id, store_id, rel_path, seq, text, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&segment.id)
            .bind(&self.store_id)
            .bind(&segment.rel_path)
            .bind(segment.seq)
            .bind(&segment.text)
            .bind(payload)
            .bind(segment.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, store_id, rel_path, name, size_bytes, media_type, indexed_at, content_ref)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(store_id, rel_path) DO UPDATE SET
                id = excluded.id,
                name = excluded.name,
                size_bytes = excluded.size_bytes,
                media_type = excluded.media_type,
                indexed_at = excluded.indexed_at,
                content_ref = excluded.content_ref
            "#,
        )
        .bind(&doc.id)
        .bind(&self.store_id)
        .bind(&doc.rel_path)
        .bind(&doc.name)
        .bind(doc.size_bytes)
        .bind(&doc.media_type)
        .bind(doc.indexed_at)
        .bind(&doc.content_ref)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        // Durable write first, cache second.
        self.cache
            .write()
            .expect("cache lock poisoned")
            .insert(doc.rel_path.clone(), segments.to_vec());

        self.refresh_store_count().await?;
        Ok(())
    }

    /// Remove the segments and document record for a path. Returns false
    /// for a path that was never indexed (a no-op, not an error).
    pub async fn delete_document(&self, rel_path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segments WHERE store_id = ? AND rel_path = ?")
            .bind(&self.store_id)
            .bind(rel_path)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE store_id = ? AND rel_path = ?")
            .bind(&self.store_id)
            .bind(rel_path)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        self.cache
            .write()
            .expect("cache lock poisoned")
            .remove(rel_path);

        self.refresh_store_count().await?;
        Ok(deleted > 0)
    }

    /// Rebuild the in-memory cache from durable rows, defensively
    /// skipping any row whose vector payload does not parse as a numeric
    /// sequence. Returns the number of rows skipped.
    pub async fn load_all(&self) -> Result<usize> {
        let rows = sqlx::query(
            r#"
            SELECT id, rel_path, seq, text, embedding, created_at
            FROM segments
            WHERE store_id = ?
            ORDER BY rel_path, seq
            "#,
        )
        .bind(&self.store_id)
        .fetch_all(&self.pool)
        .await?;

        let mut fresh: HashMap<String, Vec<Segment>> = HashMap::new();
        let mut skipped = 0usize;

        for row in &rows {
            let rel_path: String = row.get("rel_path");
            let seq: i64 = row.get("seq");
            let payload: String = row.get("embedding");

            let Some(embedding) = parse_vector_payload(&payload) else {
                warn!(
                    path = %rel_path,
                    seq,
                    "skipping segment with malformed vector payload"
                );
                skipped += 1;
                continue;
            };

            fresh.entry(rel_path.clone()).or_default().push(Segment {
                id: row.get("id"),
                rel_path,
                seq,
                text: row.get("text"),
                embedding,
                created_at: row.get("created_at"),
            });
        }

        *self.cache.write().expect("cache lock poisoned") = fresh;
        Ok(skipped)
    }

    /// Recompute and persist the owning store's document count.
    pub async fn refresh_store_count(&self) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE store_id = ?")
            .bind(&self.store_id)
            .fetch_one(&self.pool)
            .await?;

        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE stores SET document_count = ?, last_synced_at = ? WHERE id = ?")
            .bind(count)
            .bind(now)
            .bind(&self.store_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clear all rows and the cache for this store scope and recreate the
    /// store record. Used by full re-index; the caller re-scans afterward.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segments WHERE store_id = ?")
            .bind(&self.store_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE store_id = ?")
            .bind(&self.store_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM stores WHERE id = ?")
            .bind(&self.store_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.cache.write().expect("cache lock poisoned").clear();
        self.ensure_store_record().await?;
        Ok(())
    }

    /// Metadata rows for all indexed documents, ordered by path.
    pub async fn documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, store_id, rel_path, name, size_bytes, media_type, indexed_at, content_ref
            FROM documents
            WHERE store_id = ?
            ORDER BY rel_path
            "#,
        )
        .bind(&self.store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DocumentRecord {
                id: row.get("id"),
                store_id: row.get("store_id"),
                rel_path: row.get("rel_path"),
                name: row.get("name"),
                size_bytes: row.get("size_bytes"),
                media_type: row.get("media_type"),
                indexed_at: row.get("indexed_at"),
                content_ref: row.get("content_ref"),
            })
            .collect())
    }

    /// The store record for this project root.
    pub async fn store_record(&self) -> Result<StoreRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, label, project_name, root_path, created_at, last_synced_at, document_count
            FROM stores
            WHERE id = ?
            "#,
        )
        .bind(&self.store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreRecord {
            id: row.get("id"),
            label: row.get("label"),
            project_name: row.get("project_name"),
            root_path: row.get("root_path"),
            created_at: row.get("created_at"),
            last_synced_at: row.get("last_synced_at"),
            document_count: row.get("document_count"),
        })
    }

    /// Close the pool. Further calls will fail with a storage error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Parse a persisted vector payload. Empty payloads, literal absence
/// markers, and anything that is not a JSON numeric sequence yield
/// `None` — a corrupt vector must never be coerced to a default.
fn parse_vector_payload(payload: &str) -> Option<Vec<f32>> {
    let trimmed = payload.trim();
    if trimmed.is_empty() || trimmed == LOCAL_CONTENT_REF || trimmed == "null" {
        return None;
    }

    match serde_json::from_str::<Vec<f32>>(trimmed) {
        Ok(vec) if !vec.is_empty() => Some(vec),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LOCAL_CONTENT_REF;
    use tempfile::TempDir;

    fn doc(store_id: &str, rel_path: &str, size: i64) -> DocumentRecord {
        DocumentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            rel_path: rel_path.to_string(),
            name: rel_path.rsplit('/').next().unwrap_or(rel_path).to_string(),
            size_bytes: size,
            media_type: "text/markdown".to_string(),
            indexed_at: chrono::Utc::now().timestamp(),
            content_ref: LOCAL_CONTENT_REF.to_string(),
        }
    }

    fn seg(rel_path: &str, seq: i64, embedding: Vec<f32>) -> Segment {
        Segment {
            id: uuid::Uuid::new_v4().to_string(),
            rel_path: rel_path.to_string(),
            seq,
            text: format!("segment {} of {}", seq, rel_path),
            embedding,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    async fn open_store(tmp: &TempDir) -> VectorStore {
        VectorStore::open(
            &tmp.path().join("docdex.sqlite"),
            &tmp.path().join("project"),
            "project",
        )
        .await
        .unwrap()
    }

    #[test]
    fn store_id_is_deterministic() {
        let a = derive_store_id(Path::new("/home/dev/notes"));
        let b = derive_store_id(Path::new("/home/dev/notes"));
        let c = derive_store_id(Path::new("/home/dev/other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn vector_payload_parsing_is_defensive() {
        assert_eq!(parse_vector_payload("[1.0, 2.0]"), Some(vec![1.0, 2.0]));
        assert_eq!(parse_vector_payload(""), None);
        assert_eq!(parse_vector_payload("   "), None);
        assert_eq!(parse_vector_payload(LOCAL_CONTENT_REF), None);
        assert_eq!(parse_vector_payload("null"), None);
        assert_eq!(parse_vector_payload("not json"), None);
        assert_eq!(parse_vector_payload("{\"a\":1}"), None);
        assert_eq!(parse_vector_payload("[]"), None);
    }

    #[tokio::test]
    async fn upsert_replaces_previous_segments() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let sid = store.store_id().to_string();

        let three: Vec<Segment> = (0..3).map(|i| seg("a.md", i, vec![1.0, 0.0])).collect();
        store.upsert_document(&doc(&sid, "a.md", 30), &three).await.unwrap();
        assert_eq!(store.cache().get("a.md").unwrap().len(), 3);

        // Re-index with fewer chunks: stale ordinals must not linger.
        let two: Vec<Segment> = (0..2).map(|i| seg("a.md", i, vec![0.0, 1.0])).collect();
        store.upsert_document(&doc(&sid, "a.md", 20), &two).await.unwrap();
        assert_eq!(store.cache().get("a.md").unwrap().len(), 2);

        let skipped = store.load_all().await.unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(store.cache().get("a.md").unwrap().len(), 2);

        let record = store.store_record().await.unwrap();
        assert_eq!(record.document_count, 1);
    }

    #[tokio::test]
    async fn delete_document_removes_rows_and_cache_entry() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let sid = store.store_id().to_string();

        store
            .upsert_document(&doc(&sid, "a.md", 10), &[seg("a.md", 0, vec![1.0])])
            .await
            .unwrap();
        store
            .upsert_document(&doc(&sid, "b.md", 10), &[seg("b.md", 0, vec![1.0])])
            .await
            .unwrap();
        assert_eq!(store.store_record().await.unwrap().document_count, 2);

        let existed = store.delete_document("a.md").await.unwrap();
        assert!(existed);
        assert!(store.cache().get("a.md").is_none());
        assert_eq!(store.store_record().await.unwrap().document_count, 1);

        // Removing a never-indexed path is a no-op.
        let existed = store.delete_document("ghost.md").await.unwrap();
        assert!(!existed);
        assert_eq!(store.store_record().await.unwrap().document_count, 1);
    }

    #[tokio::test]
    async fn load_all_skips_malformed_vectors_but_keeps_siblings() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let sid = store.store_id().to_string();

        let segments: Vec<Segment> = (0..3).map(|i| seg("a.md", i, vec![1.0, 2.0])).collect();
        store.upsert_document(&doc(&sid, "a.md", 30), &segments).await.unwrap();

        // Corrupt the middle row's payload directly.
        sqlx::query(
            "UPDATE segments SET embedding = 'garbage' WHERE store_id = ? AND rel_path = ? AND seq = 1",
        )
        .bind(store.store_id())
        .bind("a.md")
        .execute(store.pool())
        .await
        .unwrap();

        let skipped = store.load_all().await.unwrap();
        assert_eq!(skipped, 1);

        let cache = store.cache();
        let cached = cache.get("a.md").unwrap();
        assert_eq!(cached.len(), 2);
        let seqs: Vec<i64> = cached.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![0, 2]);
    }

    #[tokio::test]
    async fn clear_all_resets_store_scope() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let sid = store.store_id().to_string();

        store
            .upsert_document(&doc(&sid, "a.md", 10), &[seg("a.md", 0, vec![1.0])])
            .await
            .unwrap();

        store.clear_all().await.unwrap();
        assert!(store.cache().is_empty());
        assert!(store.documents().await.unwrap().is_empty());

        let record = store.store_record().await.unwrap();
        assert_eq!(record.document_count, 0);
    }

    #[tokio::test]
    async fn reopening_resolves_the_same_store() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("docdex.sqlite");
        let root = tmp.path().join("project");

        let store = VectorStore::open(&db, &root, "project").await.unwrap();
        let sid = store.store_id().to_string();
        store
            .upsert_document(&doc(&sid, "a.md", 10), &[seg("a.md", 0, vec![1.0])])
            .await
            .unwrap();
        store.close().await;

        let reopened = VectorStore::open(&db, &root, "project").await.unwrap();
        assert_eq!(reopened.store_id(), sid);
        assert_eq!(reopened.cache().get("a.md").unwrap().len(), 1);
    }
}
