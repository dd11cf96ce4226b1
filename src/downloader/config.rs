// Engine configuration
//
// Sources (later wins):
// 1. Defaults
// 2. JSON file named by VIDEODOWN_CONFIG
// 3. VIDEODOWN_* environment variables

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::format_selector::CatalogOrder;

/// 50 MiB, the largest file the front end can deliver
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings recognized by the engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Socket timeout for format listing, in seconds
    pub extraction_timeout_secs: u64,
    /// Attempts for catalog discovery
    pub discovery_attempts: u32,
    /// Attempts for downloads
    pub download_attempts: u32,
    /// Pause between attempts, in milliseconds
    pub retry_delay_ms: u64,
    /// Hard ceiling for delivered files, checked after download
    pub max_file_size_bytes: u64,
    /// User-agent strings rotated by attempt index
    pub client_identities: Vec<String>,
    /// Codec for audio extraction (mp3, m4a, opus)
    pub audio_codec: String,
    /// Target quality for audio extraction (kbps or VBR level)
    pub audio_quality: String,
    /// Container used when streams are merged
    pub merge_container: String,
    /// Wall-clock ceiling for one fetch (download + transcode)
    pub transcode_timeout_secs: u64,
    /// Records per listing page
    pub page_size: usize,
    /// Ordering inside each kind class
    pub catalog_order: CatalogOrder,
    /// Parent directory for per-download working directories
    pub work_dir: Option<PathBuf>,
    /// Explicit yt-dlp binary, auto-detected when unset
    pub ytdlp_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extraction_timeout_secs: 30,
            discovery_attempts: 3,
            download_attempts: 2,
            retry_delay_ms: 500,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            client_identities: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15".to_string(),
                "Mozilla/5.0 (X11; Linux x86_64; rv:122.0) Gecko/20100101 Firefox/122.0".to_string(),
            ],
            audio_codec: "mp3".to_string(),
            audio_quality: "192".to_string(),
            merge_container: "mp4".to_string(),
            transcode_timeout_secs: 300,
            page_size: 8,
            catalog_order: CatalogOrder::Extractor,
            work_dir: None,
            ytdlp_path: None,
        }
    }
}

impl EngineConfig {
    /// Defaults, then the optional file, then environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("VIDEODOWN_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply VIDEODOWN_* overrides through `lookup` (injectable for tests)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: key.to_string(),
                    value,
                })
        }

        if let Some(v) = lookup("VIDEODOWN_EXTRACTION_TIMEOUT") {
            self.extraction_timeout_secs = parse("VIDEODOWN_EXTRACTION_TIMEOUT", v)?;
        }
        if let Some(v) = lookup("VIDEODOWN_DISCOVERY_ATTEMPTS") {
            self.discovery_attempts = parse("VIDEODOWN_DISCOVERY_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("VIDEODOWN_DOWNLOAD_ATTEMPTS") {
            self.download_attempts = parse("VIDEODOWN_DOWNLOAD_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("VIDEODOWN_MAX_FILE_SIZE") {
            self.max_file_size_bytes = parse("VIDEODOWN_MAX_FILE_SIZE", v)?;
        }
        if let Some(v) = lookup("VIDEODOWN_CLIENT_IDENTITIES") {
            // one identity per line; user agents contain commas and semicolons
            self.client_identities = v
                .lines()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("VIDEODOWN_TRANSCODE_TIMEOUT") {
            self.transcode_timeout_secs = parse("VIDEODOWN_TRANSCODE_TIMEOUT", v)?;
        }
        if let Some(v) = lookup("VIDEODOWN_PAGE_SIZE") {
            self.page_size = parse("VIDEODOWN_PAGE_SIZE", v)?;
        }
        if let Some(v) = lookup("VIDEODOWN_CATALOG_ORDER") {
            self.catalog_order = parse("VIDEODOWN_CATALOG_ORDER", v)?;
        }
        if let Some(v) = lookup("VIDEODOWN_MERGE_CONTAINER") {
            self.merge_container = v.trim().to_string();
        }
        if let Some(v) = lookup("VIDEODOWN_AUDIO_CODEC") {
            self.audio_codec = v.trim().to_string();
        }
        if let Some(v) = lookup("VIDEODOWN_AUDIO_QUALITY") {
            self.audio_quality = v.trim().to_string();
        }
        if let Some(v) = lookup("VIDEODOWN_WORK_DIR") {
            self.work_dir = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = lookup("VIDEODOWN_YTDLP") {
            self.ytdlp_path = Some(v.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery_attempts == 0 || self.download_attempts == 0 {
            return Err(ConfigError::Invalid("attempt bounds must be at least 1".into()));
        }
        if self.client_identities.is_empty() {
            return Err(ConfigError::Invalid("client identity pool is empty".into()));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page size must be at least 1".into()));
        }
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid("size ceiling must be positive".into()));
        }
        if self.extraction_timeout_secs == 0 || self.transcode_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least 1s".into()));
        }
        if self.merge_container.trim().is_empty() {
            return Err(ConfigError::Invalid("merge container is empty".into()));
        }
        Ok(())
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    pub fn with_attempts(mut self, discovery: u32, download: u32) -> Self {
        self.discovery_attempts = discovery;
        self.download_attempts = download;
        self
    }

    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    pub fn with_client_identities(mut self, identities: Vec<String>) -> Self {
        self.client_identities = identities;
        self
    }

    pub fn with_work_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.work_dir = dir;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Identity for a zero-based attempt index (round-robin)
    pub fn identity_for_attempt(&self, attempt: u32) -> &str {
        if self.client_identities.is_empty() {
            return "";
        }
        let idx = attempt as usize % self.client_identities.len();
        &self.client_identities[idx]
    }

    /// Parent for working directories
    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
