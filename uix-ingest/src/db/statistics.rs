//! Source statistics table (weight/mean/stdev per survey)

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uix_common::Result;

use crate::ledger::header_key;
use crate::models::SourceStatistics;

/// Replace the whole table with a freshly read set of statistics
pub async fn replace_statistics(pool: &SqlitePool, stats: &[SourceStatistics]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM source_statistics")
        .execute(&mut *tx)
        .await?;

    for entry in stats {
        sqlx::query(
            r#"
            INSERT INTO source_statistics (survey, weight, mean, stdev, direction, updated_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(survey) DO UPDATE SET
                weight = excluded.weight,
                mean = excluded.mean,
                stdev = excluded.stdev,
                direction = excluded.direction,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.survey)
        .bind(entry.weight)
        .bind(entry.mean)
        .bind(entry.stdev)
        .bind(&entry.direction)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn list_statistics(pool: &SqlitePool) -> Result<Vec<SourceStatistics>> {
    let rows = sqlx::query(
        "SELECT survey, weight, mean, stdev, direction FROM source_statistics ORDER BY survey",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SourceStatistics {
            survey: row.get("survey"),
            weight: row.get("weight"),
            mean: row.get("mean"),
            stdev: row.get("stdev"),
            direction: row.get("direction"),
        })
        .collect())
}

/// Statistics keyed by [`header_key`] of the survey name
pub async fn load_statistics_map(pool: &SqlitePool) -> Result<HashMap<String, SourceStatistics>> {
    Ok(list_statistics(pool)
        .await?
        .into_iter()
        .map(|s| (header_key(&s.survey), s))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uix_common::db::init_memory_database;

    fn stat(survey: &str, mean: f64) -> SourceStatistics {
        SourceStatistics {
            survey: survey.to_string(),
            weight: Some(0.1),
            mean: Some(mean),
            stdev: Some(10.0),
            direction: Some("inverse".to_string()),
        }
    }

    #[tokio::test]
    async fn test_replace_drops_stale_surveys() {
        let pool = init_memory_database().await.unwrap();
        replace_statistics(&pool, &[stat("Old Survey", 1.0), stat("NFIB Uncertainty Index", 80.0)])
            .await
            .unwrap();
        replace_statistics(&pool, &[stat("NFIB  Uncertainty Index ", 85.0)])
            .await
            .unwrap();

        let map = load_statistics_map(&pool).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["nfib uncertainty index"].mean, Some(85.0));
    }
}
