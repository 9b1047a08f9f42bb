//! Application configuration for reconcile-works.
//!
//! User config lives at `~/.reconcile-works/reconcile.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "reconcile.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".reconcile-works";

/// Default cache database file name inside the config directory.
const CACHE_FILE_NAME: &str = "cache.db";

// ---------------------------------------------------------------------------
// Config structs (matching reconcile.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// id.loc.gov connector settings.
    #[serde(default)]
    pub loc: LocConfig,

    /// Wikidata connector settings.
    #[serde(default)]
    pub wikidata: WikidataConfig,

    /// Persistent cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Matching behaviour.
    #[serde(default)]
    pub matching: MatchingConfig,
}

/// `[loc]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocConfig {
    /// Base URL of the id.loc.gov service (no trailing slash).
    #[serde(default = "default_loc_base_url")]
    pub base_url: String,

    /// Fixed-window request budget per minute.
    #[serde(default = "default_loc_rpm")]
    pub requests_per_minute: u32,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sleep before the single retry after an HTTP 429, when the response
    /// carries no usable `Retry-After`.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for LocConfig {
    fn default() -> Self {
        Self {
            base_url: default_loc_base_url(),
            requests_per_minute: default_loc_rpm(),
            timeout_secs: default_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

fn default_loc_base_url() -> String {
    "https://id.loc.gov".into()
}
fn default_loc_rpm() -> u32 {
    200
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_retry_backoff_secs() -> u64 {
    60
}

/// `[wikidata]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikidataConfig {
    /// Whether the knowledge-graph fallback runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// SPARQL endpoint.
    #[serde(default = "default_sparql_url")]
    pub sparql_url: String,

    /// MediaWiki action API (used for free-text entity search).
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Fixed-window request budget per minute.
    #[serde(default = "default_wikidata_rpm")]
    pub requests_per_minute: u32,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sleep before the single retry after an HTTP 429.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for WikidataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sparql_url: default_sparql_url(),
            api_url: default_api_url(),
            requests_per_minute: default_wikidata_rpm(),
            timeout_secs: default_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_sparql_url() -> String {
    "https://query.wikidata.org/sparql".into()
}
fn default_api_url() -> String {
    "https://www.wikidata.org/w/api.php".into()
}
fn default_wikidata_rpm() -> u32 {
    60
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache database path. Defaults to `~/.reconcile-works/cache.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// How many times to try opening the cache before giving up.
    /// `0` retries indefinitely.
    #[serde(default)]
    pub connect_attempts: u32,

    /// Initial backoff between open attempts (doubles, capped at 30s).
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
}

fn default_connect_backoff_ms() -> u64 {
    500
}

/// `[matching]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Identifier prefixes treated as already reconciled; such Works are skipped.
    #[serde(default = "default_authority_prefixes")]
    pub authority_prefixes: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            authority_prefixes: default_authority_prefixes(),
        }
    }
}

fn default_authority_prefixes() -> Vec<String> {
    vec![
        "http://id.loc.gov/resources/".into(),
        "https://id.loc.gov/resources/".into(),
        "http://www.wikidata.org/entity/".into(),
    ]
}

impl AppConfig {
    /// Resolve the cache path, falling back to the config directory.
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache.path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Ok(config_dir()?.join(CACHE_FILE_NAME)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.reconcile-works/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ReconcileError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.reconcile-works/reconcile.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReconcileError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ReconcileError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReconcileError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReconcileError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReconcileError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the rate limiters cannot work with.
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.loc.requests_per_minute == 0 {
        return Err(ReconcileError::config(
            "loc.requests_per_minute must be greater than zero",
        ));
    }
    if config.wikidata.enabled && config.wikidata.requests_per_minute == 0 {
        return Err(ReconcileError::config(
            "wikidata.requests_per_minute must be greater than zero",
        ));
    }
    Ok(())
}
