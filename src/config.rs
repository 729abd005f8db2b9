use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemorialConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub display: DisplayConfig,
    pub http: HttpConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub bucket_dir: String,
    pub bucket: String,
    /// Base URL under which bucket objects are addressed, e.g. `https://memorials.example`.
    pub public_base_url: String,
    /// HMAC key for signed object URLs. Empty means a random per-process key.
    pub signing_secret: String,
    /// Serve `/storage/v1/object/public/...` without a signature.
    pub public_read: bool,
}

/// Validity of signed display URLs, per call site.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub list_ttl_secs: u64,
    pub detail_ttl_secs: u64,
    pub lookup_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_results: u32,
    pub search_depth: String,
    /// Query sent to the search provider; `{name}` is replaced with the looked-up name.
    pub query_template: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for MemorialConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            display: DisplayConfig::default(),
            http: HttpConfig::default(),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_memorial_dir();
        Self {
            db_path: dir.join("memorials.db").to_string_lossy().into_owned(),
            bucket_dir: dir.join("bucket").to_string_lossy().into_owned(),
            bucket: "memorial_images".into(),
            public_base_url: "http://127.0.0.1:8080".into(),
            signing_secret: String::new(),
            public_read: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            list_ttl_secs: 3600,
            detail_ttl_secs: 3600,
            lookup_ttl_secs: 3600,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("memorial/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".into(),
            api_key: None,
            max_results: 5,
            search_depth: "advanced".into(),
            query_template: "Detailed biography of {name}. Include date and place of birth, \
                             date and place of death, nationality, and any available images."
                .into(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o".into(),
            timeout_secs: 120,
        }
    }
}

impl DisplayConfig {
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs)
    }

    pub fn lookup_ttl(&self) -> Duration {
        Duration::from_secs(self.lookup_ttl_secs)
    }
}

/// Returns `~/.memorial/`
pub fn default_memorial_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memorial")
}

/// Returns the default config file path: `~/.memorial/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memorial_dir().join("config.toml")
}

impl MemorialConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemorialConfig::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("MEMORIAL_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEMORIAL_BUCKET_DIR") {
            self.storage.bucket_dir = val;
        }
        if let Ok(val) = std::env::var("MEMORIAL_PUBLIC_URL") {
            self.storage.public_base_url = val;
        }
        if let Ok(val) = std::env::var("MEMORIAL_SIGNING_SECRET") {
            self.storage.signing_secret = val;
        }
        if let Ok(val) = std::env::var("MEMORIAL_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MEMORIAL_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("MEMORIAL_PORT") {
            self.server.port = val.parse().context("invalid MEMORIAL_PORT")?;
        }
        if let Ok(val) = std::env::var("TAVILY_API_KEY") {
            self.search.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.llm.api_key = Some(val);
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the bucket root directory, expanding `~` if needed.
    pub fn resolved_bucket_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.bucket_dir)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
