//! Ingest run persistence

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uix_common::{Error, Result};
use uuid::Uuid;

use super::{format_timestamp, parse_optional_timestamp, parse_timestamp, parse_uuid};
use crate::models::{IngestRun, RunStatus};

const RUN_COLUMNS: &str = "id, month, status, started_at, finished_at, message";

pub async fn insert_run(pool: &SqlitePool, run: &IngestRun) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ingest_runs (id, month, status, started_at, finished_at, message)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run.id.to_string())
    .bind(&run.month)
    .bind(run.status.as_str())
    .bind(format_timestamp(&run.started_at))
    .bind(run.finished_at.as_ref().map(format_timestamp))
    .bind(&run.message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set the terminal status, finish time and message of a run
pub async fn finalize_run(
    pool: &SqlitePool,
    id: Uuid,
    status: RunStatus,
    finished_at: DateTime<Utc>,
    message: Option<&str>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE ingest_runs SET status = ?, finished_at = ?, message = ? WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(format_timestamp(&finished_at))
    .bind(message)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Ingest run {}", id)));
    }
    Ok(())
}

pub async fn get_run(pool: &SqlitePool, id: Uuid) -> Result<Option<IngestRun>> {
    let row = sqlx::query(&format!("SELECT {} FROM ingest_runs WHERE id = ?", RUN_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| run_from_row(&r)).transpose()
}

/// Most recent run for a month label (ties broken by insertion order)
pub async fn latest_run_for_month(pool: &SqlitePool, month: &str) -> Result<Option<IngestRun>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM ingest_runs WHERE month = ? ORDER BY started_at DESC, rowid DESC LIMIT 1",
        RUN_COLUMNS
    ))
    .bind(month)
    .fetch_optional(pool)
    .await?;

    row.map(|r| run_from_row(&r)).transpose()
}

/// Newest runs first
pub async fn recent_runs(pool: &SqlitePool, limit: u32) -> Result<Vec<IngestRun>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM ingest_runs ORDER BY started_at DESC, rowid DESC LIMIT ?",
        RUN_COLUMNS
    ))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(run_from_row).collect()
}

fn run_from_row(row: &SqliteRow) -> Result<IngestRun> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");

    Ok(IngestRun {
        id: parse_uuid(&id, "ingest_runs.id")?,
        month: row.get("month"),
        status: RunStatus::parse(&status)
            .ok_or_else(|| Error::corrupt("ingest_runs.status", &status))?,
        started_at: parse_timestamp(&started_at, "started_at")?,
        finished_at: parse_optional_timestamp(row.get("finished_at"), "finished_at")?,
        message: row.get("message"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uix_common::db::init_memory_database;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 9, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_finalize() {
        let pool = init_memory_database().await.unwrap();
        let run = IngestRun::start("Mar 2026".to_string(), at(9));
        insert_run(&pool, &run).await.unwrap();

        finalize_run(&pool, run.id, RunStatus::Failed, at(9) + Duration::seconds(5), Some("boom"))
            .await
            .unwrap();

        let stored = get_run(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.message.as_deref(), Some("boom"));
        assert_eq!(stored.started_at, at(9));
        assert_eq!(stored.finished_at, Some(at(9) + Duration::seconds(5)));
    }

    #[tokio::test]
    async fn test_finalize_unknown_run_is_not_found() {
        let pool = init_memory_database().await.unwrap();
        let result = finalize_run(&pool, Uuid::new_v4(), RunStatus::Success, at(1), None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_latest_run_for_month_picks_newest() {
        let pool = init_memory_database().await.unwrap();
        let older = IngestRun::start("Feb 2026".to_string(), at(8));
        let newer = IngestRun::start("Feb 2026".to_string(), at(10));
        let other = IngestRun::start("Mar 2026".to_string(), at(11));
        for run in [&older, &newer, &other] {
            insert_run(&pool, run).await.unwrap();
        }

        let latest = latest_run_for_month(&pool, "Feb 2026").await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert!(latest_run_for_month(&pool, "Jan 2026").await.unwrap().is_none());

        let recent = recent_runs(&pool, 2).await.unwrap();
        assert_eq!(recent.iter().map(|r| r.id).collect::<Vec<_>>(), vec![other.id, newer.id]);
    }
}
