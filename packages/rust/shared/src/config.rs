//! Application configuration for blockfeed.
//!
//! User config lives at `~/.blockfeed/blockfeed.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BlockfeedError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "blockfeed.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".blockfeed";

// ---------------------------------------------------------------------------
// Config structs (matching blockfeed.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Content API connection settings.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Retry, throttle, and pagination settings.
    #[serde(default)]
    pub fetch: FetchSection,

    /// Local asset output.
    #[serde(default)]
    pub assets: AssetsSection,

    /// Build-time behavior.
    #[serde(default)]
    pub build: BuildSection,
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// API root, without a trailing slash.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Value sent in the `Notion-Version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Name of the env var holding the integration token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Name of the env var holding the database id.
    #[serde(default = "default_database_id_env")]
    pub database_id_env: String,

    /// Literal database id; takes precedence over `database_id_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<String>,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_version: default_api_version(),
            token_env: default_token_env(),
            database_id_env: default_database_id_env(),
            database_id: None,
        }
    }
}

fn default_api_base() -> String {
    "https://api.notion.com/v1".into()
}
fn default_api_version() -> String {
    "2022-06-28".into()
}
fn default_token_env() -> String {
    "NOTION_API_SECRET".into()
}
fn default_database_id_env() -> String {
    "DATABASE_ID".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Retries after the first failed attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Delay before the first retry; doubled for each further retry.
    #[serde(default = "default_retry_min_delay")]
    pub retry_min_delay_ms: u64,

    /// Minimum ms between two API calls.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Per-request timeout for API calls, asset downloads, and HTML fetches.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Directory of `<block_id>.json` files that replace remote children listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_min_delay_ms: default_retry_min_delay(),
            rate_limit_ms: default_rate_limit(),
            request_timeout_ms: default_request_timeout(),
            page_size: default_page_size(),
            snapshot_dir: None,
        }
    }
}

fn default_retries() -> u32 {
    2
}
fn default_retry_min_delay() -> u64 {
    1000
}
fn default_rate_limit() -> u64 {
    350
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_page_size() -> u32 {
    100
}

/// `[assets]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsSection {
    /// Directory that receives one sub-directory per remote asset token.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Site base path prepended to web paths.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            base_path: default_base_path(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public/notion")
}
fn default_base_path() -> String {
    "/".into()
}

/// `[build]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSection {
    /// Skip out-of-band image dimension lookups.
    #[serde(default)]
    pub fast_mode: bool,

    /// Offset from UTC used to compute "end of today" for the publish filter.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,

    /// Posts per listing page.
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: usize,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            fast_mode: false,
            utc_offset_hours: default_utc_offset(),
            posts_per_page: default_posts_per_page(),
        }
    }
}

fn default_utc_offset() -> i32 {
    9
}
fn default_posts_per_page() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime fetch configuration for the API client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// API root, without a trailing slash.
    pub api_base: String,
    /// `Notion-Version` header value.
    pub api_version: String,
    /// Bearer token.
    pub token: String,
    /// Database (container) id queried for posts.
    pub database_id: String,
    /// Retries after the first failed attempt.
    pub retries: u32,
    /// Delay before the first retry.
    pub retry_min_delay: Duration,
    /// Minimum gap between API calls.
    pub rate_limit: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Records per page.
    pub page_size: u32,
    /// Offline children listings.
    pub snapshot_dir: Option<PathBuf>,
    /// Offset from UTC for the publish filter.
    pub utc_offset_hours: i32,
    /// Skip image dimension lookups.
    pub fast_mode: bool,
}

impl FetchConfig {
    /// Build the runtime config, reading the token and database id from the environment.
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        let token = read_env(&config.notion.token_env)?;
        let database_id = match &config.notion.database_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => read_env(&config.notion.database_id_env)?,
        };

        Ok(Self {
            api_base: config.notion.api_base.trim_end_matches('/').to_string(),
            api_version: config.notion.api_version.clone(),
            token,
            database_id,
            retries: config.fetch.retries,
            retry_min_delay: Duration::from_millis(config.fetch.retry_min_delay_ms),
            rate_limit: Duration::from_millis(config.fetch.rate_limit_ms),
            request_timeout: Duration::from_millis(config.fetch.request_timeout_ms),
            page_size: config.fetch.page_size,
            snapshot_dir: config.fetch.snapshot_dir.clone(),
            utc_offset_hours: config.build.utc_offset_hours,
            fast_mode: config.build.fast_mode,
        })
    }
}

/// Runtime configuration for the asset pipeline.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Root asset directory (e.g. `public/notion`).
    pub output_dir: PathBuf,
    /// Site base path for web paths.
    pub base_path: String,
    /// Per-download timeout.
    pub request_timeout: Duration,
}

impl From<&AppConfig> for AssetConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_dir: config.assets.output_dir.clone(),
            base_path: config.assets.base_path.clone(),
            request_timeout: Duration::from_millis(config.fetch.request_timeout_ms),
        }
    }
}

fn read_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(BlockfeedError::config(format!(
            "{var_name} is not set. Export it or set it in {CONFIG_FILE_NAME}."
        ))),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.blockfeed/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BlockfeedError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.blockfeed/blockfeed.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| BlockfeedError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        BlockfeedError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BlockfeedError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BlockfeedError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BlockfeedError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("NOTION_API_SECRET"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.fetch.retries, 2);
        assert_eq!(parsed.build.utc_offset_hours, 9);
        assert_eq!(parsed.notion.api_version, "2022-06-28");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[notion]
database_id = "db-123"

[build]
fast_mode = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.notion.database_id.as_deref(), Some("db-123"));
        assert!(config.build.fast_mode);
        assert_eq!(config.fetch.page_size, 100);
        assert_eq!(config.assets.output_dir, PathBuf::from("public/notion"));
    }

    #[test]
    fn asset_config_from_app_config() {
        let app = AppConfig::default();
        let assets = AssetConfig::from(&app);
        assert_eq!(assets.base_path, "/");
        assert_eq!(assets.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn missing_token_is_a_config_error() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.notion.token_env = "BF_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = FetchConfig::from_app(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("BF_TEST_NONEXISTENT_TOKEN_12345"));
    }
}
