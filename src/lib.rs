//! docdex — local-first document indexing and retrieval-augmented Q&A.
//!
//! Indexes a project's text documents into a SQLite-backed vector store
//! and answers natural-language questions against them, grounding the
//! answer in ranked excerpts and citing their source paths.
//!
//! Module map:
//! - [`config`] — TOML configuration and validation
//! - [`models`] — core records: segments, documents, stores, answers
//! - [`error`] — the crate-wide error taxonomy
//! - [`chunk`] — deterministic overlapping text chunker
//! - [`extract`] — file-type gate and text extraction
//! - [`llm`] — embedding and inference clients (OpenAI-compatible API)
//! - [`store`] — SQLite persistence plus the in-memory vector cache
//! - [`rank`] — cosine-similarity ranking over the cache
//! - [`pipeline`] — per-document indexing orchestration
//! - [`provider`] — the backend contract and its local/cloud backends
//! - [`scan`] — project scanning and filesystem-event dispatch

pub mod chunk;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod rank;
pub mod scan;
pub mod store;
