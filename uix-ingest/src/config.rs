//! Configuration resolution for uix-ingest
//!
//! The FRED API key is resolved Database → ENV → TOML; ledger credentials
//! come from the TOML `[ledger]` section with environment overrides.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};
use uix_common::config::{LedgerConfig, TomlConfig};
use uix_common::{Error, Result};

use crate::ledger::sheets::TOKEN_URI;
use crate::ledger::{GoogleSheetsBackend, Ledger, SheetsAuth};

/// Environment variable holding the FRED API key
pub const FRED_API_KEY_ENV: &str = "UIX_FRED_API_KEY";

/// Environment variable holding a pre-issued Sheets access token
pub const SHEETS_TOKEN_ENV: &str = "UIX_SHEETS_ACCESS_TOKEN";

/// Resolve the FRED API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML. A missing key is not an error here:
/// the FRED-backed sources report their own failure at fetch time.
pub async fn resolve_fred_api_key(db: &SqlitePool, toml_config: &TomlConfig) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_fred_api_key(db).await?.filter(|k| is_valid_key(k));
    let env_key = std::env::var(FRED_API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_config.sources.fred_api_key.clone().filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "FRED API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("FRED API key loaded from database");
        return Ok(Some(key.trim().to_string()));
    }
    if let Some(key) = env_key {
        info!("FRED API key loaded from environment variable");
        return Ok(Some(key.trim().to_string()));
    }
    if let Some(key) = toml_key {
        info!("FRED API key loaded from TOML config");
        return Ok(Some(key.trim().to_string()));
    }

    warn!(
        "FRED API key not configured; FRED-backed sources will fail. Set {} or [sources] fred_api_key",
        FRED_API_KEY_ENV
    );
    Ok(None)
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Credentials for the Sheets API
///
/// An access token (env first, then TOML) wins over a service account.
pub fn sheets_auth(config: &LedgerConfig) -> Result<SheetsAuth> {
    let token = std::env::var(SHEETS_TOKEN_ENV)
        .ok()
        .or_else(|| config.access_token.clone())
        .filter(|t| is_valid_key(t));
    if let Some(token) = token {
        return Ok(SheetsAuth::AccessToken(token.trim().to_string()));
    }

    match (&config.client_email, &config.private_key) {
        (Some(email), Some(key)) if is_valid_key(email) && is_valid_key(key) => Ok(SheetsAuth::ServiceAccount {
            client_email: email.trim().to_string(),
            private_key: key.clone(),
            token_uri: TOKEN_URI.to_string(),
        }),
        _ => Err(Error::Config(format!(
            "Ledger credentials not configured: set {} or [ledger] client_email and private_key",
            SHEETS_TOKEN_ENV
        ))),
    }
}

/// Ledger over the Google Sheets backend described by `[ledger]`
pub fn build_ledger(config: &LedgerConfig, timeout: Duration) -> Result<Ledger> {
    let spreadsheet_id = config
        .spreadsheet_id
        .as_deref()
        .filter(|id| is_valid_key(id))
        .ok_or_else(|| Error::Config("[ledger] spreadsheet_id is required".to_string()))?;

    let backend = GoogleSheetsBackend::new(spreadsheet_id, sheets_auth(config)?, config.base_url.clone(), timeout)
        .map_err(|e| Error::Config(e.to_string()))?;

    Ok(Ledger::new(
        Arc::new(backend),
        config.data_sheet.clone(),
        config.zscore_sheet.clone(),
        config.meta_sheet.clone(),
    ))
}
