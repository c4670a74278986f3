//! User repository — lightweight records keyed by the caller-supplied
//! owner id. Upserted on every submission.

use rusqlite::params;

use super::{Database, DatabaseError};

/// A user row from the database.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
    pub job_count: i64,
}

/// Records a submission for the given owner: creates the row on first
/// sight, otherwise bumps `last_seen_at` and the job counter.
pub fn record_submission(db: &Database, owner_id: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO users (id, first_seen_at, last_seen_at, job_count)
             VALUES (?1, ?2, ?2, 1)
             ON CONFLICT(id) DO UPDATE SET
               last_seen_at = ?2,
               job_count = job_count + 1",
            params![owner_id, now],
        )?;
        Ok(())
    })
}

/// Finds a user by owner id.
pub fn find_by_id(db: &Database, owner_id: &str) -> Result<Option<UserRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, first_seen_at, last_seen_at, job_count FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![owner_id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                first_seen_at: row.get(1)?,
                last_seen_at: row.get(2)?,
                job_count: row.get(3)?,
            })
        })?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
