//! Application configuration for kbsync.
//!
//! User config lives at `~/.kbsync/kbsync.toml`.
//! The API credential is resolved from an environment variable whose *name*
//! is configured — the key itself is never stored on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KbSyncError, Result};
use crate::types::RoutingStrategy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbsync";

// ---------------------------------------------------------------------------
// Config structs (matching kbsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Catalog service connection settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Sync run behavior.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Destination dataset identifiers, attempted in configured order.
    #[serde(default)]
    pub knowledge_bases: Vec<String>,
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the knowledge-base service API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.dify.ai/v1".into()
}
fn default_api_key_env() -> String {
    "KBSYNC_API_KEY".into()
}
fn default_request_timeout() -> u64 {
    30
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Routing strategy: primary, all, or round_robin.
    #[serde(default = "default_strategy")]
    pub strategy: RoutingStrategy,

    /// Maximum attempts for a retryable network call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry delay in milliseconds (doubled on each attempt).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Path to the persisted url→hash state file.
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            state_file: default_state_file(),
        }
    }
}

fn default_strategy() -> RoutingStrategy {
    RoutingStrategy::Primary
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_state_file() -> String {
    "kbsync_state.json".into()
}

// ---------------------------------------------------------------------------
// Runtime sync config (merged, credential resolved)
// ---------------------------------------------------------------------------

/// Runtime configuration handed to the sync engine — explicit value, no
/// ambient global state.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Resolved API credential.
    pub api_key: String,
    /// Base URL of the catalog service.
    pub api_base_url: String,
    /// Destination dataset ids in configured order.
    pub knowledge_bases: Vec<String>,
    /// Routing strategy for changed documents.
    pub strategy: RoutingStrategy,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum attempts for retryable calls.
    pub max_attempts: u32,
    /// Base backoff delay.
    pub base_delay: Duration,
    /// State file location.
    pub state_file: PathBuf,
}

impl AppConfig {
    /// Build the runtime [`SyncConfig`], resolving the credential and
    /// failing fast on an empty credential or destination list.
    pub fn sync_config(&self) -> Result<SyncConfig> {
        let api_key = resolve_api_key(&self.catalog.api_key_env)?;

        if self.knowledge_bases.is_empty() {
            return Err(KbSyncError::config(
                "no knowledge bases configured. Add dataset ids under `knowledge_bases` \
                 in kbsync.toml.",
            ));
        }

        Ok(SyncConfig {
            api_key,
            api_base_url: self.catalog.api_base_url.trim_end_matches('/').to_string(),
            knowledge_bases: self.knowledge_bases.clone(),
            strategy: self.sync.strategy,
            request_timeout: Duration::from_secs(self.catalog.request_timeout_secs),
            max_attempts: self.sync.max_attempts,
            base_delay: Duration::from_millis(self.sync.base_delay_ms),
            state_file: PathBuf::from(&self.sync.state_file),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KbSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbsync/kbsync.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| KbSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| KbSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KbSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KbSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KbSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the API credential from its configured env var.
fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(KbSyncError::config(format!(
            "catalog API key not found. Set the {var_name} environment variable."
        ))),
    }
}
