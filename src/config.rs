//! TOML configuration.
//!
//! A single file configures every command. Only `[db]` and `[index]` are
//! required; everything else has defaults.
//!
//! ```toml
//! [db]
//! path = "./data/filevault.sqlite"
//!
//! [index]
//! path = "./data/index.json"
//!
//! [admission]
//! min_text_length = 50
//!
//! [scan]
//! kinds = ["pdf", "docx", "markdown", "text"]
//! exclude_globs = ["**/drafts/**"]
//!
//! [embedding]
//! provider = "hashing"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{Context, Result};
use filevault_core::models::ContentKind;
use globset::Glob;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdmissionConfig {
    /// Extracted text shorter than this (in characters, after trimming)
    /// is not admitted.
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_text_length: default_min_text_length(),
        }
    }
}

fn default_min_text_length() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ContentKind>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            kinds: default_kinds(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_kinds() -> Vec<ContentKind> {
    ContentKind::ALL.to_vec()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for HTTP providers (`ollama` defaults to the local daemon).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hashing".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

const HASHING_DEFAULT_DIMS: usize = 256;

impl EmbeddingConfig {
    /// Vector width, falling back to the hashing embedder's default.
    pub fn resolved_dims(&self) -> usize {
        self.dims.unwrap_or(HASHING_DEFAULT_DIMS)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.index.default_top_k == 0 {
        anyhow::bail!("index.default_top_k must be >= 1");
    }

    if config.scan.kinds.is_empty() {
        anyhow::bail!("scan.kinds must list at least one content kind");
    }
    for pattern in &config.scan.exclude_globs {
        Glob::new(pattern).with_context(|| format!("Invalid exclude glob: {}", pattern))?;
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hashing" => {
            if config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0");
            }
        }
        "openai" | "ollama" | "local" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashing, openai, ollama, or local.",
            other
        ),
    }

    Ok(config)
}
