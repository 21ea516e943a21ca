//! Source release schedule persistence

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uix_common::{Error, Result};

use super::{format_date, format_timestamp, parse_date, parse_timestamp};
use crate::models::SourceReleaseSchedule;

pub async fn get_schedule(
    pool: &SqlitePool,
    source_name: &str,
) -> Result<Option<SourceReleaseSchedule>> {
    let row = sqlx::query(
        r#"
        SELECT source_name, advance_months, next_expected_release_date, updated_at
        FROM source_release_schedules
        WHERE source_name = ?
        "#,
    )
    .bind(source_name)
    .fetch_optional(pool)
    .await?;

    row.map(|r| schedule_from_row(&r)).transpose()
}

pub async fn list_schedules(pool: &SqlitePool) -> Result<Vec<SourceReleaseSchedule>> {
    let rows = sqlx::query(
        r#"
        SELECT source_name, advance_months, next_expected_release_date, updated_at
        FROM source_release_schedules
        ORDER BY source_name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(schedule_from_row).collect()
}

/// Insert or replace cadence and next date for a source
pub async fn upsert_schedule(pool: &SqlitePool, schedule: &SourceReleaseSchedule) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO source_release_schedules
            (source_name, advance_months, next_expected_release_date, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(source_name) DO UPDATE SET
            advance_months = excluded.advance_months,
            next_expected_release_date = excluded.next_expected_release_date,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&schedule.source_name)
    .bind(i64::from(schedule.advance_months))
    .bind(format_date(&schedule.next_expected_release_date))
    .bind(format_timestamp(&schedule.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert only when the source has no schedule yet; returns whether a row was added
pub async fn insert_if_missing(pool: &SqlitePool, schedule: &SourceReleaseSchedule) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO source_release_schedules
            (source_name, advance_months, next_expected_release_date, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&schedule.source_name)
    .bind(i64::from(schedule.advance_months))
    .bind(format_date(&schedule.next_expected_release_date))
    .bind(format_timestamp(&schedule.updated_at))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn update_next_date(
    pool: &SqlitePool,
    source_name: &str,
    next: NaiveDate,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE source_release_schedules
        SET next_expected_release_date = ?, updated_at = ?
        WHERE source_name = ?
        "#,
    )
    .bind(format_date(&next))
    .bind(format_timestamp(&updated_at))
    .bind(source_name)
    .execute(pool)
    .await?;

    Ok(())
}

fn schedule_from_row(row: &SqliteRow) -> Result<SourceReleaseSchedule> {
    let advance_months: i64 = row.get("advance_months");
    let next: String = row.get("next_expected_release_date");
    let updated_at: String = row.get("updated_at");

    Ok(SourceReleaseSchedule {
        source_name: row.get("source_name"),
        advance_months: u32::try_from(advance_months)
            .map_err(|e| Error::corrupt("advance_months", e))?,
        next_expected_release_date: parse_date(&next, "next_expected_release_date")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}
