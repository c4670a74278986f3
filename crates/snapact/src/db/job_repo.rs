//! Job repository — CRUD operations for the `jobs` table.
//!
//! All reads and user-facing mutations are scoped by `(id, owner_id)`.
//! Pipeline status transitions are conditional writes (`WHERE status =
//! <expected prior>`), so a transition that lost the race reports `false`
//! instead of clobbering a terminal state.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    pub status: String,
    pub source: String,
    pub ocr_text: String,
    pub item_type: Option<String>,
    pub classification: Option<String>,
    pub fields: Option<String>,
    pub summary: Option<String>,
    pub thumb: Option<String>,
    pub is_favorite: bool,
    pub action_applied: bool,
    pub action_type: Option<String>,
    pub action_applied_at: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            status: row.get("status")?,
            source: row.get("source")?,
            ocr_text: row.get("ocr_text")?,
            item_type: row.get("item_type")?,
            classification: row.get("classification")?,
            fields: row.get("fields")?,
            summary: row.get("summary")?,
            thumb: row.get("thumb")?,
            is_favorite: row.get("is_favorite")?,
            action_applied: row.get("action_applied")?,
            action_type: row.get("action_type")?,
            action_applied_at: row.get("action_applied_at")?,
            error_code: row.get("error_code")?,
            error_message: row.get("error_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new job row. Fails on id collision (primary key violation) —
/// an existing row is never silently overwritten.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, owner_id, status, source, ocr_text, item_type,
             classification, fields, summary, thumb, is_favorite, action_applied,
             action_type, action_applied_at, error_code, error_message,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                job.id,
                job.owner_id,
                job.status,
                job.source,
                job.ocr_text,
                job.item_type,
                job.classification,
                job.fields,
                job.summary,
                job.thumb,
                job.is_favorite,
                job.action_applied,
                job.action_type,
                job.action_applied_at,
                job.error_code,
                job.error_message,
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID, scoped to the owning user. A job belonging to a
/// different owner is indistinguishable from a missing one.
pub fn find_by_id_and_owner(
    db: &Database,
    id: &str,
    owner_id: &str,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1 AND owner_id = ?2")?;
        let mut rows = stmt.query_map(params![id, owner_id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds a job by ID alone. Pipeline-internal; API paths must use
/// [`find_by_id_and_owner`].
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Moves a job from one status to the next. The write only lands when the
/// row is still in the expected prior status; returns whether it did.
pub fn transition_status(
    db: &Database,
    id: &str,
    from: &str,
    to: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            params![id, from, to, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Stores extracted text and moves `ocr_in_progress -> ocr_done` in one
/// statement.
pub fn complete_ocr(
    db: &Database,
    id: &str,
    ocr_text: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET ocr_text = ?2, status = 'ocr_done', updated_at = ?3
             WHERE id = ?1 AND status = 'ocr_in_progress'",
            params![id, ocr_text, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Stores the generated thumbnail. Touches no status-machine columns.
pub fn store_thumb(
    db: &Database,
    id: &str,
    thumb: &str,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET thumb = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, thumb, updated_at],
        )?;
        Ok(())
    })
}

/// Writes the classification outcome and moves `ai_in_progress -> ready`.
/// A single UPDATE, so a reader can never observe `ready` without fields.
#[allow(clippy::too_many_arguments)]
pub fn complete_ready(
    db: &Database,
    id: &str,
    item_type: &str,
    classification: &str,
    fields: &str,
    summary: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'ready', item_type = ?2, classification = ?3,
             fields = ?4, summary = ?5, updated_at = ?6
             WHERE id = ?1 AND status = 'ai_in_progress'",
            params![id, item_type, classification, fields, summary, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Marks a job failed with a normalized error. Only lands on non-terminal
/// rows; a job that already reached `ready` or `failed` is left alone.
pub fn mark_failed(
    db: &Database,
    id: &str,
    error_code: &str,
    error_message: &str,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', error_code = ?2, error_message = ?3,
             updated_at = ?4
             WHERE id = ?1 AND status NOT IN ('ready', 'failed')",
            params![id, error_code, error_message, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Overwrites the editable projection (`fields`, optionally `summary`).
/// Owner-scoped; independent of pipeline status.
pub fn update_fields(
    db: &Database,
    id: &str,
    owner_id: &str,
    fields: &str,
    summary: Option<&str>,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = match summary {
            Some(summary) => conn.execute(
                "UPDATE jobs SET fields = ?3, summary = ?4, updated_at = ?5
                 WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id, fields, summary, updated_at],
            )?,
            None => conn.execute(
                "UPDATE jobs SET fields = ?3, updated_at = ?4
                 WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id, fields, updated_at],
            )?,
        };
        Ok(changed == 1)
    })
}

/// Sets the favorite flag. Owner-scoped; independent of pipeline status.
pub fn set_favorite(
    db: &Database,
    id: &str,
    owner_id: &str,
    is_favorite: bool,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET is_favorite = ?3, updated_at = ?4
             WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id, is_favorite, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Records that the user acted (or un-acted) on the result.
pub fn mark_action(
    db: &Database,
    id: &str,
    owner_id: &str,
    applied: bool,
    action_type: Option<&str>,
    applied_at: Option<&str>,
    updated_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET action_applied = ?3, action_type = ?4, action_applied_at = ?5,
             updated_at = ?6
             WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id, applied, action_type, applied_at, updated_at],
        )?;
        Ok(changed == 1)
    })
}

/// Deletes a job. Owner-scoped.
pub fn delete_by_id_and_owner(
    db: &Database,
    id: &str,
    owner_id: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM jobs WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        Ok(changed == 1)
    })
}

/// Lists an owner's jobs, newest first, with keyset pagination: pass the
/// `created_at` of the last seen row as `cursor` to fetch the next page.
pub fn list_by_owner(
    db: &Database,
    owner_id: &str,
    limit: u64,
    cursor: Option<&str>,
    item_type: Option<&str>,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["owner_id = ?1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(owner_id.to_string())];

        if let Some(cursor) = cursor {
            conditions.push(format!("created_at < ?{}", param_values.len() + 1));
            param_values.push(Box::new(cursor.to_string()));
        }
        if let Some(item_type) = item_type {
            conditions.push(format!("item_type = ?{}", param_values.len() + 1));
            param_values.push(Box::new(item_type.to_string()));
        }

        param_values.push(Box::new(limit as i64));
        let sql = format!(
            "SELECT * FROM jobs WHERE {} ORDER BY created_at DESC LIMIT ?{}",
            conditions.join(" AND "),
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}

/// Counts an owner's `ready` jobs created within `[since, until)`.
/// This is the monthly-quota query; `until` is the start of the next month.
pub fn count_ready_in_range(
    db: &Database,
    owner_id: &str,
    since: &str,
    until: &str,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs
             WHERE owner_id = ?1 AND status = 'ready'
               AND created_at >= ?2 AND created_at < ?3",
            params![owner_id, since, until],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Marks every non-terminal job as failed. Run once at startup so jobs
/// orphaned by a crash mid-pipeline do not poll as in-progress forever.
pub fn sweep_orphaned(
    db: &Database,
    error_code: &str,
    error_message: &str,
    updated_at: &str,
) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status = 'failed', error_code = ?1, error_message = ?2,
             updated_at = ?3
             WHERE status NOT IN ('ready', 'failed')",
            params![error_code, error_message, updated_at],
        )?;
        Ok(changed as u64)
    })
}
