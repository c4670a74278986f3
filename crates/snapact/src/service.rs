//! Submission & polling API core.
//!
//! Synchronous validation happens here and never creates a job; once a
//! row is durably inserted the detached pipeline run is spawned and the
//! caller gets its receipt immediately. Everything a transport layer
//! (HTTP, CLI, tests) needs is on [`JobService`].

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{job_repo, stats_repo, user_repo, Database, DatabaseError};
use crate::job::{JobView, Source};
use crate::media;
use crate::pipeline::{JobInput, JobPipeline};
use crate::quota::{QuotaGuard, QuotaStatus};
use crate::sanitize;
use crate::taxonomy::ErrorCode;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("missing user id")]
    MissingUserId,

    #[error("missing image")]
    MissingImage,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("service is in maintenance mode")]
    Maintenance,

    #[error("monthly limit reached")]
    LimitReached(QuotaStatus),

    #[error("job not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Database(#[from] DatabaseError),
}

impl ServiceError {
    /// The stable client-facing code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::MissingUserId => ErrorCode::MissingUserId,
            ServiceError::MissingImage => ErrorCode::MissingImage,
            ServiceError::InvalidImage(_) => ErrorCode::InvalidImage,
            ServiceError::Maintenance => ErrorCode::MaintenanceMode,
            ServiceError::LimitReached(_) => ErrorCode::LimitReached,
            ServiceError::NotFound => ErrorCode::JobNotFound,
            ServiceError::Database(_) => ErrorCode::ServerError,
        }
    }
}

/// A validated submission.
pub struct SubmitRequest {
    pub owner_id: String,
    pub image: Vec<u8>,
    pub want_thumb: bool,
    pub source: Source,
    pub lang: String,
}

/// What the submitter gets back, before any processing has happened.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub job_id: String,
    pub status: String,
}

/// One page of an owner's job history, newest first.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub items: Vec<JobView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

const DEFAULT_HISTORY_LIMIT: u64 = 20;
const MAX_HISTORY_LIMIT: u64 = 100;

pub struct JobService {
    db: Database,
    pipeline: Arc<JobPipeline>,
    quota: QuotaGuard,
    maintenance_mode: bool,
}

impl JobService {
    pub fn new(
        db: Database,
        pipeline: Arc<JobPipeline>,
        quota: QuotaGuard,
        maintenance_mode: bool,
    ) -> Self {
        Self {
            db,
            pipeline,
            quota,
            maintenance_mode,
        }
    }

    /// Marks jobs orphaned in a non-terminal status as failed. Run once at
    /// startup, before the server accepts traffic.
    pub fn recover_orphans(&self) -> Result<u64, DatabaseError> {
        let swept = job_repo::sweep_orphaned(
            &self.db,
            ErrorCode::ProcessingFailed.as_str(),
            "processing interrupted by service restart",
            &Utc::now().to_rfc3339(),
        )?;
        if swept > 0 {
            warn!("Marked {} orphaned jobs as failed on startup", swept);
        }
        Ok(swept)
    }

    /// Validates and accepts a submission, then launches the detached
    /// pipeline run. Returns as soon as the job record exists; OCR and
    /// classification results arrive through polling.
    pub fn submit(&self, request: SubmitRequest) -> Result<SubmitReceipt, ServiceError> {
        let owner_id = request.owner_id.trim().to_string();
        if owner_id.is_empty() {
            return Err(ServiceError::MissingUserId);
        }
        if request.image.is_empty() {
            return Err(ServiceError::MissingImage);
        }
        if self.maintenance_mode {
            return Err(ServiceError::Maintenance);
        }

        let quota = self.quota.check(&owner_id)?;
        if !quota.allowed {
            return Err(ServiceError::LimitReached(quota));
        }

        media::validate_image(&request.image)
            .map_err(|e| ServiceError::InvalidImage(e.to_string()))?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let row = job_repo::JobRow {
            id: job_id.clone(),
            owner_id: owner_id.clone(),
            status: "received".to_string(),
            source: request.source.as_str().to_string(),
            ocr_text: String::new(),
            item_type: None,
            classification: None,
            fields: None,
            summary: None,
            thumb: None,
            is_favorite: false,
            action_applied: false,
            action_type: None,
            action_applied_at: None,
            error_code: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now.clone(),
        };
        job_repo::insert(&self.db, &row)?;

        // Ancillary bookkeeping; a failure here must not reject the job.
        if let Err(e) = user_repo::record_submission(&self.db, &owner_id, &now) {
            warn!(
                "Failed to upsert user record for owner {}: {}",
                sanitize::redact_owner(&owner_id),
                e
            );
        }

        info!(
            "Accepted job {} from owner {}",
            job_id,
            sanitize::redact_owner(&owner_id)
        );

        Arc::clone(&self.pipeline).spawn(JobInput {
            job_id: job_id.clone(),
            owner_id,
            image: request.image,
            want_thumb: request.want_thumb,
            lang: request.lang,
        });

        Ok(SubmitReceipt {
            job_id,
            status: "received".to_string(),
        })
    }

    /// Owner-scoped read of the full observable job state.
    pub fn get(&self, job_id: &str, owner_id: &str) -> Result<JobView, ServiceError> {
        let row = job_repo::find_by_id_and_owner(&self.db, job_id, owner_id)?
            .ok_or(ServiceError::NotFound)?;
        Ok(JobView::from_row(&row))
    }

    /// Overlays a partial edit onto the stored projection and returns the
    /// merged record. Independent of pipeline status.
    pub fn update_fields(
        &self,
        job_id: &str,
        owner_id: &str,
        patch: &serde_json::Value,
        summary: Option<&str>,
    ) -> Result<serde_json::Value, ServiceError> {
        let row = job_repo::find_by_id_and_owner(&self.db, job_id, owner_id)?
            .ok_or(ServiceError::NotFound)?;

        let mut merged = row
            .fields
            .as_deref()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        if let Some(patch_object) = patch.as_object() {
            for (key, value) in patch_object {
                merged.insert(key.clone(), value.clone());
            }
        }
        let merged = serde_json::Value::Object(merged);

        let updated = job_repo::update_fields(
            &self.db,
            job_id,
            owner_id,
            &merged.to_string(),
            summary,
            &Utc::now().to_rfc3339(),
        )?;
        if !updated {
            return Err(ServiceError::NotFound);
        }
        Ok(merged)
    }

    /// Sets the favorite flag; idempotent.
    pub fn set_favorite(
        &self,
        job_id: &str,
        owner_id: &str,
        is_favorite: bool,
    ) -> Result<bool, ServiceError> {
        let updated = job_repo::set_favorite(
            &self.db,
            job_id,
            owner_id,
            is_favorite,
            &Utc::now().to_rfc3339(),
        )?;
        if !updated {
            return Err(ServiceError::NotFound);
        }
        Ok(is_favorite)
    }

    /// Records whether the user acted on the result.
    pub fn mark_action(
        &self,
        job_id: &str,
        owner_id: &str,
        applied: bool,
        action_type: Option<&str>,
    ) -> Result<(), ServiceError> {
        let now = Utc::now().to_rfc3339();
        let applied_at = applied.then_some(now.as_str());
        let updated = job_repo::mark_action(
            &self.db,
            job_id,
            owner_id,
            applied,
            action_type,
            applied_at,
            &now,
        )?;
        if !updated {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    /// Deletes the job. Owner-scoped; no automatic expiry exists.
    pub fn delete(&self, job_id: &str, owner_id: &str) -> Result<(), ServiceError> {
        let deleted = job_repo::delete_by_id_and_owner(&self.db, job_id, owner_id)?;
        if !deleted {
            return Err(ServiceError::NotFound);
        }
        Ok(())
    }

    /// The owner's current quota standing.
    pub fn check_limit(&self, owner_id: &str) -> Result<QuotaStatus, ServiceError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(ServiceError::MissingUserId);
        }
        Ok(self.quota.check(owner_id)?)
    }

    /// Daily processing statistics, optionally bounded by `YYYY-MM-DD`
    /// dates. Aggregates only; no per-owner data.
    pub fn stats(
        &self,
        from_date: Option<&str>,
        to_date: Option<&str>,
    ) -> Result<Vec<stats_repo::ProcessingStatRow>, ServiceError> {
        Ok(stats_repo::query(&self.db, from_date, to_date)?)
    }

    /// One page of the owner's jobs, strictly descending by `created_at`.
    /// `cursor` is the `createdAt` of the last item of the previous page.
    pub fn history(
        &self,
        owner_id: &str,
        limit: Option<u64>,
        cursor: Option<&str>,
        item_type: Option<&str>,
    ) -> Result<HistoryPage, ServiceError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(ServiceError::MissingUserId);
        }

        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let rows = job_repo::list_by_owner(&self.db, owner_id, limit, cursor, item_type)?;

        let next_cursor = if rows.len() as u64 == limit {
            rows.last().map(|row| row.created_at.clone())
        } else {
            None
        };
        let items = rows.iter().map(JobView::from_row).collect();

        Ok(HistoryPage { items, next_cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::config::{PreprocessConfig, QuotaConfig, ThumbnailConfig};
    use crate::job::JobStatus;
    use crate::providers::{Classifier, ProviderError, TextExtractor};
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Cursor;

    struct StubExtractor;

    #[async_trait]
    impl TextExtractor for StubExtractor {
        async fn extract_text(&self, _image: &[u8]) -> Result<String, ProviderError> {
            Ok("stub text".to_string())
        }
    }

    struct StubClassifier;

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(&self, _text: &str, _lang: &str) -> Result<Classification, ProviderError> {
            Classification::from_provider_json(json!({"type": "note", "title": "Stub"}))
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        }
    }

    fn sample_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn service(db: &Database, limit: u32, maintenance: bool) -> JobService {
        let pipeline = Arc::new(JobPipeline::new(
            db.clone(),
            Arc::new(StubExtractor),
            Arc::new(StubClassifier),
            PreprocessConfig::default(),
            ThumbnailConfig::default(),
        ));
        let quota = QuotaGuard::new(
            db.clone(),
            &QuotaConfig {
                monthly_limit: limit,
                fail_open: true,
            },
        );
        JobService::new(db.clone(), pipeline, quota, maintenance)
    }

    fn submit_request(owner: &str) -> SubmitRequest {
        SubmitRequest {
            owner_id: owner.to_string(),
            image: sample_png(),
            want_thumb: false,
            source: Source::Picker,
            lang: "en".to_string(),
        }
    }

    async fn poll_until_terminal(service: &JobService, job_id: &str, owner: &str) -> JobView {
        for _ in 0..200 {
            let view = service.get(job_id, owner).unwrap();
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    #[tokio::test]
    async fn test_submit_returns_received_and_completes() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        assert_eq!(receipt.status, "received");

        let view = poll_until_terminal(&service, &receipt.job_id, "u1").await;
        assert_eq!(view.status, JobStatus::Ready);
        assert_eq!(view.item_type.as_deref(), Some("note"));
    }

    #[tokio::test]
    async fn test_submit_validation_order() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let mut request = submit_request("  ");
        assert!(matches!(
            service.submit(request).unwrap_err(),
            ServiceError::MissingUserId
        ));

        request = submit_request("u1");
        request.image = vec![];
        assert!(matches!(
            service.submit(request).unwrap_err(),
            ServiceError::MissingImage
        ));

        request = submit_request("u1");
        request.image = b"not an image".to_vec();
        assert!(matches!(
            service.submit(request).unwrap_err(),
            ServiceError::InvalidImage(_)
        ));
    }

    #[tokio::test]
    async fn test_maintenance_mode_rejects_before_any_job_is_created() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, true);

        let err = service.submit(submit_request("u1")).unwrap_err();
        assert!(matches!(err, ServiceError::Maintenance));
        assert_eq!(err.code(), ErrorCode::MaintenanceMode);

        let count: u32 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_quota_exhausted_rejects_without_creating_a_job() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 1, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        poll_until_terminal(&service, &receipt.job_id, "u1").await;

        let err = service.submit(submit_request("u1")).unwrap_err();
        assert!(matches!(err, ServiceError::LimitReached(_)));
        assert_eq!(err.code(), ErrorCode::LimitReached);

        let count: u32 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_get_is_owner_scoped() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let receipt = service.submit(submit_request("alice")).unwrap();
        assert!(service.get(&receipt.job_id, "alice").is_ok());
        assert!(matches!(
            service.get(&receipt.job_id, "bob").unwrap_err(),
            ServiceError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_favorite_is_idempotent_and_status_independent() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        let view = poll_until_terminal(&service, &receipt.job_id, "u1").await;
        let fields_before = view.fields.clone();

        assert!(service.set_favorite(&receipt.job_id, "u1", true).unwrap());
        assert!(service.set_favorite(&receipt.job_id, "u1", true).unwrap());

        let view = service.get(&receipt.job_id, "u1").unwrap();
        assert!(view.is_favorite);
        assert_eq!(view.status, JobStatus::Ready);
        assert_eq!(view.fields, fields_before);
    }

    #[tokio::test]
    async fn test_mark_action_records_timestamp() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        poll_until_terminal(&service, &receipt.job_id, "u1").await;

        service
            .mark_action(&receipt.job_id, "u1", true, Some("calendar"))
            .unwrap();

        let view = service.get(&receipt.job_id, "u1").unwrap();
        assert!(view.action.applied);
        assert_eq!(view.action.action_type.as_deref(), Some("calendar"));
        assert!(view.action.applied_at.is_some());
    }

    #[tokio::test]
    async fn test_update_fields_then_read_back() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        poll_until_terminal(&service, &receipt.job_id, "u1").await;

        let edited = json!({"title": "Renamed", "body": "hand-edited"});
        service
            .update_fields(&receipt.job_id, "u1", &edited, Some("Renamed"))
            .unwrap();

        let view = service.get(&receipt.job_id, "u1").unwrap();
        assert_eq!(view.fields.unwrap()["title"], "Renamed");
        assert_eq!(view.summary.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        poll_until_terminal(&service, &receipt.job_id, "u1").await;

        service.delete(&receipt.job_id, "u1").unwrap();
        assert!(matches!(
            service.get(&receipt.job_id, "u1").unwrap_err(),
            ServiceError::NotFound
        ));
        assert!(matches!(
            service.delete(&receipt.job_id, "u1").unwrap_err(),
            ServiceError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_history_pages_descending() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let receipt = service.submit(submit_request("u1")).unwrap();
            poll_until_terminal(&service, &receipt.job_id, "u1").await;
            ids.push(receipt.job_id);
            // Distinct created_at values for stable cursor ordering.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let page1 = service.history("u1", Some(2), None, None).unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.next_cursor.is_some());
        assert!(page1.items[0].created_at > page1.items[1].created_at);

        let page2 = service
            .history("u1", Some(2), page1.next_cursor.as_deref(), None)
            .unwrap();
        assert_eq!(page2.items.len(), 1);
        assert!(page2.next_cursor.is_none());

        let seen: Vec<&str> = page1
            .items
            .iter()
            .chain(page2.items.iter())
            .map(|v| v.job_id.as_str())
            .collect();
        for id in &ids {
            assert!(seen.contains(&id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_check_limit_reports_usage() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 5, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        poll_until_terminal(&service, &receipt.job_id, "u1").await;

        let status = service.check_limit("u1").unwrap();
        assert!(status.allowed);
        assert_eq!(status.used, 1);
        assert_eq!(status.limit, 5);
        assert_eq!(status.remaining(), 4);

        assert!(matches!(
            service.check_limit("  ").unwrap_err(),
            ServiceError::MissingUserId
        ));
    }

    #[tokio::test]
    async fn test_stats_recorded_on_completion() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let receipt = service.submit(submit_request("u1")).unwrap();
        poll_until_terminal(&service, &receipt.job_id, "u1").await;

        let rows = service.stats(None, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].item_type, "note");
        assert_eq!(rows[0].total_processed, 1);
        assert_eq!(rows[0].total_succeeded, 1);
    }

    #[tokio::test]
    async fn test_recover_orphans_marks_stuck_jobs() {
        let db = Database::open_in_memory().unwrap();
        let service = service(&db, 50, false);

        let mut stuck = job_repo::JobRow {
            id: "stuck-1".to_string(),
            owner_id: "u1".to_string(),
            status: "ai_in_progress".to_string(),
            source: "picker".to_string(),
            ocr_text: "text".to_string(),
            item_type: None,
            classification: None,
            fields: None,
            summary: None,
            thumb: None,
            is_favorite: false,
            action_applied: false,
            action_type: None,
            action_applied_at: None,
            error_code: None,
            error_message: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        };
        job_repo::insert(&db, &stuck).unwrap();
        stuck.id = "stuck-2".to_string();
        stuck.status = "ready".to_string();
        job_repo::insert(&db, &stuck).unwrap();

        assert_eq!(service.recover_orphans().unwrap(), 1);

        let view = service.get("stuck-1", "u1").unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.unwrap().code, ErrorCode::ProcessingFailed);
    }
}
