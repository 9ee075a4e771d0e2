//! Supported-type detection and plain-text extraction.
//!
//! Indexing only considers files on an explicit extension allow-list;
//! everything else is silently skipped rather than reported as an error.
//! Extraction reads the file as UTF-8 (lossy) and normalizes line
//! endings; a read failure is an [`IndexError::Extraction`].

use std::path::Path;

use crate::error::{IndexError, Result};

/// Extensions eligible for indexing.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "json", "csv"];

/// Whether this path's extension is in the allow-list.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Media type recorded on the document record.
pub fn media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("md") | Some("markdown") => "text/markdown",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        _ => "text/plain",
    }
}

/// Read a supported file and return its normalized text.
pub fn extract_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| IndexError::Extraction {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let text = String::from_utf8_lossy(&bytes);
    Ok(normalize(&text))
}

/// Collapse CRLF to LF and strip a UTF-8 BOM if present.
pub fn normalize(text: &str) -> String {
    text.trim_start_matches('\u{feff}').replace("\r\n", "\n")
}

/// Forward-slash normalized path of `path` relative to `root`.
pub fn relative_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
