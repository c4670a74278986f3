//! Monthly usage quota.
//!
//! A submission is allowed while the owner has fewer than `limit` jobs
//! that reached `ready` in the current wall-clock calendar month. When the
//! count itself fails and the fail-open policy is set, availability wins:
//! the submission is allowed and the event is logged as degraded.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::config::QuotaConfig;
use crate::db::{job_repo, Database, DatabaseError};
use crate::sanitize;

/// Outcome of a quota check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub allowed: bool,
    pub used: u64,
    pub limit: u32,
    pub resets_at: DateTime<Utc>,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u64 {
        u64::from(self.limit).saturating_sub(self.used)
    }
}

/// Checks submissions against the monthly limit.
#[derive(Clone)]
pub struct QuotaGuard {
    db: Database,
    limit: u32,
    fail_open: bool,
}

impl QuotaGuard {
    pub fn new(db: Database, config: &QuotaConfig) -> Self {
        Self {
            db,
            limit: config.monthly_limit,
            fail_open: config.fail_open,
        }
    }

    /// Checks the owner's usage for the month containing `Utc::now()`.
    pub fn check(&self, owner_id: &str) -> Result<QuotaStatus, DatabaseError> {
        self.check_at(owner_id, Utc::now())
    }

    /// Checks the owner's usage for the month containing `now`.
    pub fn check_at(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, DatabaseError> {
        let (month_start, next_month_start) = month_bounds(now);

        let counted = job_repo::count_ready_in_range(
            &self.db,
            owner_id,
            &month_start.to_rfc3339(),
            &next_month_start.to_rfc3339(),
        );

        let used = match counted {
            Ok(used) => used,
            Err(e) if self.fail_open => {
                log::warn!(
                    "Quota check failed for owner {}, failing open (degraded mode): {}",
                    sanitize::redact_owner(owner_id),
                    e
                );
                return Ok(QuotaStatus {
                    allowed: true,
                    used: 0,
                    limit: self.limit,
                    resets_at: next_month_start,
                });
            }
            Err(e) => return Err(e),
        };

        Ok(QuotaStatus {
            allowed: used < u64::from(self.limit),
            used,
            limit: self.limit,
            resets_at: next_month_start,
        })
    }
}

/// Returns `[start of this month, start of next month)` for the month
/// containing `now`.
fn month_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now);

    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let next = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);

    (start, next)
}
