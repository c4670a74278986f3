//! Processing statistics repository — records and queries aggregate metrics.

use rusqlite::params;
use serde::Serialize;

use super::{Database, DatabaseError};

/// Records a terminal job outcome into the daily statistics.
///
/// Uses UPSERT to increment counters for the matching `(date, item_type)`
/// combination. Failed jobs have no detected type and land under `""`.
pub fn record_job_outcome(
    db: &Database,
    date: &str,
    item_type: Option<&str>,
    succeeded: bool,
    duration_ms: i64,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let success_val: i64 = if succeeded { 1 } else { 0 };
        let failure_val: i64 = if succeeded { 0 } else { 1 };

        // Running-average formula: In SQLite's ON CONFLICT DO UPDATE, column
        // references on the right side resolve to the *pre-update* (old)
        // values. With old count N and old avg A, the correct update is:
        //   new_avg = (A * N + new_value) / (N + 1)
        conn.execute(
            "INSERT INTO processing_stats (date, item_type,
             total_processed, total_succeeded, total_failed, avg_duration_ms)
             VALUES (?1, ?2, 1, ?3, ?4, ?5)
             ON CONFLICT(date, item_type) DO UPDATE SET
               total_processed = total_processed + 1,
               total_succeeded = total_succeeded + ?3,
               total_failed = total_failed + ?4,
               avg_duration_ms = (avg_duration_ms * total_processed + ?5) / (total_processed + 1)",
            params![
                date,
                item_type.unwrap_or(""),
                success_val,
                failure_val,
                duration_ms,
            ],
        )?;
        Ok(())
    })
}

/// A single statistics row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatRow {
    pub date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub item_type: String,
    pub total_processed: i64,
    pub total_succeeded: i64,
    pub total_failed: i64,
    pub avg_duration_ms: i64,
}

/// Queries statistics rows with optional date filters.
pub fn query(
    db: &Database,
    from_date: Option<&str>,
    to_date: Option<&str>,
) -> Result<Vec<ProcessingStatRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(from) = from_date {
            conditions.push(format!("date >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from.to_string()));
        }
        if let Some(to) = to_date {
            conditions.push(format!("date <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT date, item_type, total_processed, total_succeeded,
             total_failed, avg_duration_ms
             FROM processing_stats {} ORDER BY date DESC",
            where_clause
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<ProcessingStatRow> = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(ProcessingStatRow {
                    date: row.get(0)?,
                    item_type: row.get(1)?,
                    total_processed: row.get(2)?,
                    total_succeeded: row.get(3)?,
                    total_failed: row.get(4)?,
                    avg_duration_ms: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}
