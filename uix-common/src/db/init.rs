//! Database initialization
//!
//! Creates the SQLite file if needed, applies connection pragmas and creates
//! every table with `CREATE TABLE IF NOT EXISTS` so startup is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (or create) the database at `db_path` and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the approval UI read while an ingest run writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Every pooled connection to `:memory:` would otherwise see its own empty
/// database, so the pool is capped at one connection.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_settings_table(pool).await?;
    create_ingest_runs_table(pool).await?;
    create_source_values_table(pool).await?;
    create_source_release_schedules_table(pool).await?;
    create_source_statistics_table(pool).await?;

    Ok(())
}

/// Key-value settings (runtime secrets such as the FRED API key)
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_ingest_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            id TEXT PRIMARY KEY,
            month TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingest_runs_month ON ingest_runs(month, started_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_source_values_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_values (
            id TEXT PRIMARY KEY,
            ingest_id TEXT NOT NULL REFERENCES ingest_runs(id) ON DELETE CASCADE,
            source_name TEXT NOT NULL,
            source_url TEXT NOT NULL,
            value REAL,
            previous_value REAL,
            delta REAL,
            status TEXT NOT NULL,
            carried_forward INTEGER NOT NULL DEFAULT 0,
            value_date TEXT,
            message TEXT,
            approval_status TEXT NOT NULL DEFAULT 'PENDING',
            approval_note TEXT,
            approved_by TEXT,
            approved_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_source_values_ingest ON source_values(ingest_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_source_release_schedules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_release_schedules (
            source_name TEXT PRIMARY KEY,
            advance_months INTEGER NOT NULL,
            next_expected_release_date TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_source_statistics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_statistics (
            survey TEXT PRIMARY KEY,
            weight REAL,
            mean REAL,
            stdev REAL,
            direction TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
