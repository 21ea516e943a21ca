//! Settings table accessors
//!
//! Generic key/value storage; the FRED API key is the only runtime secret
//! read from here.

use sqlx::SqlitePool;
use std::fmt::Display;
use std::str::FromStr;
use uix_common::{Error, Result};

pub const FRED_API_KEY_SETTING: &str = "fred_api_key";

/// Read and parse a setting, `None` when absent or NULL
pub async fn get_setting<T: FromStr>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row.and_then(|(value,)| value) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for setting {}: {}", key, raw))),
        None => Ok(None),
    }
}

/// Insert or replace a setting
pub async fn set_setting<T: Display>(pool: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_fred_api_key(pool: &SqlitePool) -> Result<Option<String>> {
    let key: Option<String> = get_setting(pool, FRED_API_KEY_SETTING).await?;
    Ok(key.filter(|k| !k.trim().is_empty()))
}

pub async fn set_fred_api_key(pool: &SqlitePool, key: &str) -> Result<()> {
    set_setting(pool, FRED_API_KEY_SETTING, key.trim()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use uix_common::db::init_memory_database;

    #[tokio::test]
    async fn test_setting_round_trip_and_overwrite() {
        let pool = init_memory_database().await.unwrap();

        assert_eq!(get_setting::<u32>(&pool, "max_wait").await.unwrap(), None);
        set_setting(&pool, "max_wait", 250).await.unwrap();
        set_setting(&pool, "max_wait", 500).await.unwrap();
        assert_eq!(get_setting::<u32>(&pool, "max_wait").await.unwrap(), Some(500));
    }

    #[tokio::test]
    async fn test_unparseable_setting_is_config_error() {
        let pool = init_memory_database().await.unwrap();
        set_setting(&pool, "max_wait", "soon").await.unwrap();
        assert!(matches!(
            get_setting::<u32>(&pool, "max_wait").await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_fred_key_reads_as_absent() {
        let pool = init_memory_database().await.unwrap();
        set_fred_api_key(&pool, "   ").await.unwrap();
        assert_eq!(get_fred_api_key(&pool).await.unwrap(), None);

        set_fred_api_key(&pool, " abc123 ").await.unwrap();
        assert_eq!(get_fred_api_key(&pool).await.unwrap().as_deref(), Some("abc123"));
    }
}
