//! Bootstrap configuration and root folder resolution
//!
//! Bootstrap settings come from a TOML file; every value can be overridden by
//! the command line or environment in the binary. Runtime secrets that an
//! operator may rotate (the FRED API key) also live in the `settings` table.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "UIX_ROOT_FOLDER";

/// Environment variable naming an explicit TOML config file
pub const CONFIG_FILE_ENV: &str = "UIX_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "uix.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the SQLite database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen address, e.g. `127.0.0.1:5740`
    #[serde(default)]
    pub bind_address: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub sources: SourcesConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// External ledger (spreadsheet) connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Spreadsheet identifier
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    /// Sheet holding the raw monthly values
    #[serde(default = "default_data_sheet")]
    pub data_sheet: String,

    /// Sheet holding the derived z-score formulas
    #[serde(default = "default_zscore_sheet")]
    pub zscore_sheet: String,

    /// Sheet holding per-survey weight/mean/stdev
    #[serde(default = "default_meta_sheet")]
    pub meta_sheet: String,

    /// Pre-issued OAuth access token (takes precedence over service account)
    #[serde(default)]
    pub access_token: Option<String>,

    /// Service account e-mail
    #[serde(default)]
    pub client_email: Option<String>,

    /// Service account PEM private key (`\n` escapes accepted)
    #[serde(default)]
    pub private_key: Option<String>,

    /// API base URL override
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            data_sheet: default_data_sheet(),
            zscore_sheet: default_zscore_sheet(),
            meta_sheet: default_meta_sheet(),
            access_token: None,
            client_email: None,
            private_key: None,
            base_url: None,
        }
    }
}

/// Survey source retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub fred_api_key: Option<String>,

    #[serde(default)]
    pub fred_base_url: Option<String>,

    /// Scraped page cache lifetime
    #[serde(default = "default_page_cache_ttl_secs")]
    pub page_cache_ttl_secs: u64,

    /// Parsed workbook cache lifetime
    #[serde(default = "default_workbook_cache_ttl_secs")]
    pub workbook_cache_ttl_secs: u64,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Sources fetched concurrently within one run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fred_api_key: None,
            fred_base_url: None,
            page_cache_ttl_secs: default_page_cache_ttl_secs(),
            workbook_cache_ttl_secs: default_workbook_cache_ttl_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_sheet() -> String {
    "Data".to_string()
}

fn default_zscore_sheet() -> String {
    "zscores".to_string()
}

fn default_meta_sheet() -> String {
    "Meta".to_string()
}

fn default_page_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_workbook_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

/// Load the TOML bootstrap file
///
/// Resolution order: explicit path → `UIX_CONFIG` → platform config dir.
/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var(CONFIG_FILE_ENV)
            .ok()
            .map(PathBuf::from)
            .or_else(default_config_path),
    };

    let Some(path) = path else {
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if explicit.is_some() {
            return Err(Error::Config(format!("Config file not found: {}", path.display())));
        }
        tracing::debug!("No config file at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Platform config file location (`~/.config/uix/uix-ingest.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("uix").join("uix-ingest.toml"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `UIX_ROOT_FOLDER`
/// 3. TOML `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("uix"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/uix"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("uix"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/uix"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("uix"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\uix"))
    } else {
        PathBuf::from("./uix_data")
    }
}
