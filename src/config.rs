use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub read: ReadConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

/// Index location and extraction limits
#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    /// Directory holding the workbooks to index (scanned non-recursively).
    pub watch_dir: PathBuf,
    /// JSON snapshot of the index.
    pub snapshot_path: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Seconds after the last refresh before `search` refreshes on its own.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    /// Maximum data rows read per sheet during extraction.
    #[serde(default = "default_row_cap")]
    pub row_cap: usize,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    /// Bytes of file prefix covered by the content fingerprint.
    #[serde(default = "default_hash_prefix_bytes")]
    pub hash_prefix_bytes: usize,
    /// Per-file extraction budget; 0 disables it.
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Limits for direct sheet reads
#[derive(Debug, Clone, Deserialize)]
pub struct ReadConfig {
    #[serde(default = "default_read_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_read_default_rows")]
    pub default_rows: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            max_rows: default_read_max_rows(),
            default_rows: default_read_default_rows(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Environment variable holding a bearer key. Unset means no auth.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            api_key_env: None,
            allowed_origins: Vec::new(),
        }
    }
}

/// Directory watcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_extension() -> String {
    "xlsx".to_string()
}

fn default_staleness_secs() -> u64 {
    300
}

fn default_row_cap() -> usize {
    1000
}

fn default_preview_rows() -> usize {
    5
}

fn default_hash_prefix_bytes() -> usize {
    8192
}

fn default_extract_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_read_max_rows() -> usize {
    500
}

fn default_read_default_rows() -> usize {
    100
}

fn default_http_port() -> u16 {
    8000
}

fn default_debounce_ms() -> u64 {
    500
}

impl IndexConfig {
    /// Index settings with defaults for everything but the two paths.
    pub fn new(watch_dir: impl Into<PathBuf>, snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            snapshot_path: snapshot_path.into(),
            extension: default_extension(),
            staleness_secs: default_staleness_secs(),
            row_cap: default_row_cap(),
            preview_rows: default_preview_rows(),
            hash_prefix_bytes: default_hash_prefix_bytes(),
            extract_timeout_secs: default_extract_timeout_secs(),
            log_level: default_log_level(),
        }
    }

    /// Extension without a leading dot, lowercased.
    pub fn normalized_extension(&self) -> String {
        self.extension.trim_start_matches('.').to_lowercase()
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in SHEETINDEX_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("SHEETINDEX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration rooted at `watch_dir`, with the snapshot beside it.
    pub fn for_directory(watch_dir: impl Into<PathBuf>) -> Self {
        let watch_dir = watch_dir.into();
        let snapshot_path = watch_dir
            .parent()
            .map(|p| p.join("excel_index.json"))
            .unwrap_or_else(|| PathBuf::from("excel_index.json"));
        Self {
            index: IndexConfig::new(watch_dir, snapshot_path),
            read: ReadConfig::default(),
            http_server: HttpServerConfig::default(),
            watch: WatchConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.index.watch_dir.exists() && !self.index.watch_dir.is_dir() {
            anyhow::bail!(
                "index.watch_dir must be a directory, not a file: {}",
                self.index.watch_dir.display()
            );
        }

        if self.index.normalized_extension().is_empty() {
            anyhow::bail!("index.extension must not be empty");
        }

        if self.index.row_cap == 0 {
            anyhow::bail!("index.row_cap must be greater than 0");
        }

        if self.index.preview_rows == 0 || self.index.preview_rows > self.index.row_cap {
            anyhow::bail!("index.preview_rows must be between 1 and index.row_cap");
        }

        if self.index.hash_prefix_bytes == 0 {
            anyhow::bail!("index.hash_prefix_bytes must be greater than 0");
        }

        if self.read.max_rows == 0 {
            anyhow::bail!("read.max_rows must be greater than 0");
        }

        if self.read.default_rows == 0 || self.read.default_rows > self.read.max_rows {
            anyhow::bail!("read.default_rows must be between 1 and read.max_rows");
        }

        Ok(())
    }

    /// Get the watched directory
    pub fn watch_dir(&self) -> &Path {
        &self.index.watch_dir
    }

    /// Get the snapshot path
    pub fn snapshot_path(&self) -> &Path {
        &self.index.snapshot_path
    }
}
