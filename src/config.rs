use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub project: ProjectConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl ProjectConfig {
    /// Project name: explicit config value, else the root directory name.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "project".to_string())
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// `"local"` or `"cloud"`. Selected once at startup and held for the
    /// session.
    #[serde(default = "default_backend")]
    pub provider: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_backend(),
        }
    }
}

fn default_backend() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_inference_model")]
    pub inference_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            api_key: String::new(),
            embedding_model: default_embedding_model(),
            inference_model: default_inference_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "http://localhost:8000/v1".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_inference_model() -> String {
    "gpt-4.1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_size")]
    pub target_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_target_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

/// Managed cloud search service. Only consulted when `backend.provider`
/// is `"cloud"`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CloudConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.target_size == 0 {
        anyhow::bail!("chunking.target_size must be > 0");
    }

    match config.backend.provider.as_str() {
        "local" => {}
        "cloud" => {
            if config.cloud.base_url.is_empty() {
                anyhow::bail!("cloud.base_url must be set when backend.provider is 'cloud'");
            }
        }
        other => anyhow::bail!(
            "Unknown backend provider: '{}'. Must be local or cloud.",
            other
        ),
    }

    Ok(config)
}
