//! Source value persistence
//!
//! Rows are written once per run per source. Afterwards only the approval
//! fields change, or an edit replaces value/delta and resets approval.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uix_common::{Error, Result};
use uuid::Uuid;

use super::{format_date, format_timestamp, parse_date, parse_optional_timestamp, parse_uuid};
use crate::models::{ApprovalStatus, NewSourceValue, SourceStatus, SourceValue};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

const VALUE_COLUMNS: &str = r#"
    id, ingest_id, source_name, source_url, value, previous_value, delta, status,
    carried_forward, value_date, message, approval_status, approval_note,
    approved_by, approved_at
"#;

/// Persist one source's resolved value for a run
///
/// Called from concurrently running per-source tasks, so lock contention is
/// retried.
pub async fn insert_source_value(
    pool: &SqlitePool,
    ingest_id: Uuid,
    new_value: &NewSourceValue,
    created_at: DateTime<Utc>,
) -> Result<SourceValue> {
    let id = Uuid::new_v4();
    let id_str = id.to_string();
    let ingest_id_str = ingest_id.to_string();
    let value_date = new_value.value_date.as_ref().map(format_date);
    let created_at = format_timestamp(&created_at);

    retry_on_lock("insert_source_value", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO source_values (
                id, ingest_id, source_name, source_url, value, previous_value, delta,
                status, carried_forward, value_date, message, approval_status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'PENDING', ?)
            "#,
        )
        .bind(&id_str)
        .bind(&ingest_id_str)
        .bind(&new_value.source_name)
        .bind(&new_value.source_url)
        .bind(new_value.value)
        .bind(new_value.previous_value)
        .bind(new_value.delta)
        .bind(new_value.status.as_str())
        .bind(new_value.carried_forward)
        .bind(&value_date)
        .bind(&new_value.message)
        .bind(&created_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await?;

    Ok(SourceValue {
        id,
        ingest_id,
        source_name: new_value.source_name.clone(),
        source_url: new_value.source_url.clone(),
        value: new_value.value,
        previous_value: new_value.previous_value,
        delta: new_value.delta,
        status: new_value.status,
        carried_forward: new_value.carried_forward,
        value_date: new_value.value_date,
        message: new_value.message.clone(),
        approval_status: ApprovalStatus::Pending,
        approval_note: None,
        approved_by: None,
        approved_at: None,
    })
}

/// All values of a run, ordered by source name
pub async fn list_for_run(pool: &SqlitePool, ingest_id: Uuid) -> Result<Vec<SourceValue>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM source_values WHERE ingest_id = ? ORDER BY source_name ASC",
        VALUE_COLUMNS
    ))
    .bind(ingest_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(value_from_row).collect()
}

pub async fn get_source_value(pool: &SqlitePool, id: Uuid) -> Result<Option<SourceValue>> {
    let row = sqlx::query(&format!("SELECT {} FROM source_values WHERE id = ?", VALUE_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| value_from_row(&r)).transpose()
}

/// Record an approve/reject decision (the note replaces any earlier note)
pub async fn set_approval(
    pool: &SqlitePool,
    id: Uuid,
    status: ApprovalStatus,
    note: Option<&str>,
    approved_by: &str,
    approved_at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE source_values
        SET approval_status = ?, approval_note = ?, approved_by = ?, approved_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(note)
    .bind(approved_by)
    .bind(format_timestamp(&approved_at))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), id)
}

/// Replace the value of a row and send it back to review
pub async fn apply_edit(
    pool: &SqlitePool,
    id: Uuid,
    value: f64,
    delta: Option<f64>,
    note: Option<&str>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE source_values
        SET value = ?, delta = ?, carried_forward = 0,
            approval_status = 'PENDING', approval_note = ?,
            approved_by = NULL, approved_at = NULL
        WHERE id = ?
        "#,
    )
    .bind(value)
    .bind(delta)
    .bind(note)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    ensure_updated(result.rows_affected(), id)
}

fn ensure_updated(rows_affected: u64, id: Uuid) -> Result<()> {
    if rows_affected == 0 {
        Err(Error::NotFound(format!("Source value {}", id)))
    } else {
        Ok(())
    }
}

fn value_from_row(row: &SqliteRow) -> Result<SourceValue> {
    let id: String = row.get("id");
    let ingest_id: String = row.get("ingest_id");
    let status: String = row.get("status");
    let approval_status: String = row.get("approval_status");
    let value_date: Option<String> = row.get("value_date");

    Ok(SourceValue {
        id: parse_uuid(&id, "source_values.id")?,
        ingest_id: parse_uuid(&ingest_id, "source_values.ingest_id")?,
        source_name: row.get("source_name"),
        source_url: row.get("source_url"),
        value: row.get("value"),
        previous_value: row.get("previous_value"),
        delta: row.get("delta"),
        status: SourceStatus::parse(&status)
            .ok_or_else(|| Error::corrupt("source_values.status", &status))?,
        carried_forward: row.get::<i64, _>("carried_forward") != 0,
        value_date: value_date
            .map(|d| parse_date(&d, "value_date"))
            .transpose()?,
        message: row.get("message"),
        approval_status: ApprovalStatus::parse(&approval_status)
            .ok_or_else(|| Error::corrupt("source_values.approval_status", &approval_status))?,
        approval_note: row.get("approval_note"),
        approved_by: row.get("approved_by"),
        approved_at: parse_optional_timestamp(row.get("approved_at"), "approved_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::runs::insert_run;
    use crate::models::IngestRun;
    use chrono::{NaiveDate, TimeZone};
    use uix_common::db::init_memory_database;

    fn new_value(name: &str, value: Option<f64>) -> NewSourceValue {
        NewSourceValue {
            source_name: name.to_string(),
            source_url: format!("https://example.test/{}", name),
            value,
            previous_value: Some(90.0),
            delta: value.map(|v| v - 90.0),
            status: SourceStatus::Success,
            carried_forward: false,
            value_date: NaiveDate::from_ymd_opt(2026, 2, 28),
            message: None,
        }
    }

    async fn setup() -> (SqlitePool, Uuid) {
        let pool = init_memory_database().await.unwrap();
        let run = IngestRun::start("Feb 2026".to_string(), Utc::now());
        insert_run(&pool, &run).await.unwrap();
        (pool, run.id)
    }

    #[tokio::test]
    async fn test_insert_and_list_sorted_by_name() {
        let (pool, run_id) = setup().await;
        insert_source_value(&pool, run_id, &new_value("Zeta", Some(95.0)), Utc::now())
            .await
            .unwrap();
        insert_source_value(&pool, run_id, &new_value("Alpha", None), Utc::now())
            .await
            .unwrap();

        let values = list_for_run(&pool, run_id).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].source_name, "Alpha");
        assert_eq!(values[0].value, None);
        assert_eq!(values[1].delta, Some(5.0));
        assert_eq!(values[1].value_date, NaiveDate::from_ymd_opt(2026, 2, 28));
        assert!(values.iter().all(|v| v.approval_status == ApprovalStatus::Pending));
    }

    #[tokio::test]
    async fn test_edit_clears_prior_approval() {
        let (pool, run_id) = setup().await;
        let mut carried = new_value("Alpha", Some(90.0));
        carried.carried_forward = true;
        let stored = insert_source_value(&pool, run_id, &carried, Utc::now()).await.unwrap();

        let approved_at = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
        set_approval(&pool, stored.id, ApprovalStatus::Approved, None, "analyst", approved_at)
            .await
            .unwrap();
        let approved = get_source_value(&pool, stored.id).await.unwrap().unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        assert_eq!(approved.approved_at, Some(approved_at));

        apply_edit(&pool, stored.id, 93.5, Some(3.5), Some("revised"))
            .await
            .unwrap();
        let edited = get_source_value(&pool, stored.id).await.unwrap().unwrap();
        assert_eq!(edited.value, Some(93.5));
        assert_eq!(edited.delta, Some(3.5));
        assert!(!edited.carried_forward);
        assert_eq!(edited.approval_status, ApprovalStatus::Pending);
        assert_eq!(edited.approved_by, None);
        assert_eq!(edited.approved_at, None);
        assert_eq!(edited.approval_note.as_deref(), Some("revised"));
    }

    #[tokio::test]
    async fn test_updates_on_missing_row_are_not_found() {
        let (pool, _) = setup().await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            apply_edit(&pool, missing, 1.0, None, None).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            set_approval(&pool, missing, ApprovalStatus::Rejected, None, "a", Utc::now()).await,
            Err(Error::NotFound(_))
        ));
    }
}
