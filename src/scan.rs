//! Project directory scanning and file-event dispatch.
//!
//! The scanner walks the project root once and returns supported files
//! in a deterministic order; full re-index and session startup both run
//! on it. [`apply_event`] is the single entry point for filesystem
//! change notifications: events for one path are applied serially, and
//! a change to an unsupported or excluded path is ignored.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::ProjectConfig;
use crate::error::{IndexError, Result};
use crate::extract;
use crate::pipeline::IndexOutcome;
use crate::provider::Backend;

/// Directory trees no project wants indexed, excluded regardless of
/// configuration.
const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// A filesystem change the index must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
}

/// Walks a project root for indexable documents.
#[derive(Debug)]
pub struct ProjectScanner {
    root: PathBuf,
    excludes: GlobSet,
}

impl ProjectScanner {
    pub fn new(project: &ProjectConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_EXCLUDES {
            builder.add(
                Glob::new(pattern)
                    .map_err(|e| IndexError::Config(format!("invalid exclude glob: {}", e)))?,
            );
        }
        for pattern in &project.exclude_globs {
            builder.add(
                Glob::new(pattern).map_err(|e| {
                    IndexError::Config(format!("invalid exclude glob '{}': {}", pattern, e))
                })?,
            );
        }
        let excludes = builder
            .build()
            .map_err(|e| IndexError::Config(format!("failed to build exclude set: {}", e)))?;

        Ok(Self {
            root: project.root.clone(),
            excludes,
        })
    }

    /// Whether a path is inside the project scope and eligible for
    /// indexing: supported extension, not matched by an exclude glob.
    pub fn accepts(&self, path: &Path) -> bool {
        if !extract::is_supported(path) {
            return false;
        }
        let rel = extract::relative_path(path, &self.root);
        !self.excludes.is_match(rel.as_str())
    }

    /// Walk the root and collect every indexable file, sorted by path so
    /// repeated scans of an unchanged tree produce identical output.
    /// Unreadable directories are logged and skipped, not fatal.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| self.accepts(p))
            .collect();

        files.sort();
        files
    }
}

/// Apply one filesystem event against the backend. Create and change
/// both run the full index path (the pipeline's replace semantics make
/// them equivalent); delete removes the document. Events against paths
/// the scanner does not accept are dropped.
pub async fn apply_event(
    backend: &dyn Backend,
    scanner: &ProjectScanner,
    event: FileEvent,
) -> Result<Option<IndexOutcome>> {
    match event {
        FileEvent::Created(path) | FileEvent::Changed(path) => {
            if !scanner.accepts(&path) {
                return Ok(None);
            }
            backend.index(&path).await.map(Some)
        }
        FileEvent::Deleted(path) => {
            // A deleted path has no extension-based gate worth applying:
            // let removal be a no-op if it was never indexed.
            backend.remove(&path).await?;
            Ok(None)
        }
    }
}
