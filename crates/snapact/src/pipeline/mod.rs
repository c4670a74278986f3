//! The per-job state machine.
//!
//! One detached task per submitted job drives `received ->
//! ocr_in_progress -> ocr_done -> ai_in_progress -> ready`, persisting
//! each transition with a conditional write so a terminal state is never
//! overwritten. Failures are normalized into the stable taxonomy and
//! written to the job record; nothing is retried here — retry is a fresh
//! client submission.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

use crate::classify::projector;
use crate::config::{PreprocessConfig, ThumbnailConfig};
use crate::db::{job_repo, stats_repo, Database, DatabaseError};
use crate::error::MediaError;
use crate::media;
use crate::providers::{Classifier, ProviderError, TextExtractor};
use crate::sanitize;
use crate::taxonomy::{self, ErrorCode};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Media(#[from] MediaError),

    #[error("Capability call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Persistence failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Everything a detached run needs; handed over at spawn time.
pub struct JobInput {
    pub job_id: String,
    pub owner_id: String,
    pub image: Vec<u8>,
    pub want_thumb: bool,
    pub lang: String,
}

/// How a run ended. `Aborted` means a conditional transition found the
/// row in an unexpected state; some other writer owns it and this run
/// backs off without touching anything.
enum Outcome {
    Ready(String),
    Aborted,
}

pub struct JobPipeline {
    db: Database,
    extractor: Arc<dyn TextExtractor>,
    classifier: Arc<dyn Classifier>,
    preprocess: PreprocessConfig,
    thumbnail: ThumbnailConfig,
}

impl JobPipeline {
    pub fn new(
        db: Database,
        extractor: Arc<dyn TextExtractor>,
        classifier: Arc<dyn Classifier>,
        preprocess: PreprocessConfig,
        thumbnail: ThumbnailConfig,
    ) -> Self {
        Self {
            db,
            extractor,
            classifier,
            preprocess,
            thumbnail,
        }
    }

    /// Launches the detached run for a freshly created job. Fire and
    /// forget: the caller returns to the client immediately. Must be
    /// called exactly once per job id.
    pub fn spawn(self: Arc<Self>, input: JobInput) {
        tokio::spawn(async move {
            self.run(input).await;
        });
    }

    /// Drives a single job to a terminal state and records the outcome.
    pub async fn run(&self, input: JobInput) {
        let job_id = input.job_id.clone();
        let started = Instant::now();
        let span = info_span!(
            "pipeline",
            job_id = %job_id,
            owner = %sanitize::redact_owner(&input.owner_id),
        );

        let result = self.execute(input).instrument(span).await;
        let duration_ms = started.elapsed().as_millis() as i64;
        let date = Utc::now().format("%Y-%m-%d").to_string();

        match result {
            Ok(Outcome::Ready(item_type)) => {
                if let Err(e) = stats_repo::record_job_outcome(
                    &self.db,
                    &date,
                    Some(&item_type),
                    true,
                    duration_ms,
                ) {
                    log::error!("Failed to record job statistics: {}", e);
                }
            }
            Ok(Outcome::Aborted) => {}
            Err(e) => {
                let code = failure_code(&e);
                let message = e.to_string();
                warn!("Job {} failed with {}: {}", job_id, code, message);

                let now = Utc::now().to_rfc3339();
                match job_repo::mark_failed(&self.db, &job_id, code.as_str(), &message, &now) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!("Job {} already terminal, failure not recorded", job_id)
                    }
                    Err(db_err) => {
                        log::error!("Failed to persist failure for job {}: {}", job_id, db_err)
                    }
                }

                if let Err(stats_err) =
                    stats_repo::record_job_outcome(&self.db, &date, None, false, duration_ms)
                {
                    log::error!("Failed to record job statistics: {}", stats_err);
                }
            }
        }
    }

    async fn execute(&self, input: JobInput) -> Result<Outcome, PipelineError> {
        let JobInput {
            job_id,
            owner_id: _,
            image,
            want_thumb,
            lang,
        } = input;

        if !job_repo::transition_status(
            &self.db,
            &job_id,
            "received",
            "ocr_in_progress",
            &Utc::now().to_rfc3339(),
        )? {
            warn!("Job {} is not in received state, aborting run", job_id);
            return Ok(Outcome::Aborted);
        }

        // Preprocess: bound the image size and re-encode for OCR.
        let preprocess_config = self.preprocess.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            media::preprocess(&image, &preprocess_config)
        })
        .instrument(info_span!("preprocess"))
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

        let text = self
            .extractor
            .extract_text(&prepared)
            .instrument(info_span!("ocr"))
            .await?;
        tracing::debug!("Job {} extracted text {}", job_id, sanitize::describe_text(&text));

        if !job_repo::complete_ocr(&self.db, &job_id, &text, &Utc::now().to_rfc3339())? {
            warn!("Job {} left ocr_in_progress concurrently, aborting run", job_id);
            return Ok(Outcome::Aborted);
        }

        // Thumbnail is best-effort: a failure leaves thumb null and the
        // job continues.
        if want_thumb {
            let thumbnail_config = self.thumbnail.clone();
            let bytes = prepared.clone();
            let generated =
                tokio::task::spawn_blocking(move || media::make_thumbnail(&bytes, &thumbnail_config))
                    .instrument(info_span!("thumbnail"))
                    .await;
            match generated {
                Ok(Ok(thumb)) => {
                    job_repo::store_thumb(&self.db, &job_id, &thumb, &Utc::now().to_rfc3339())?
                }
                Ok(Err(e)) => warn!("Thumbnail generation failed for job {}: {}", job_id, e),
                Err(e) => warn!("Thumbnail task failed for job {}: {}", job_id, e),
            }
        }

        if !job_repo::transition_status(
            &self.db,
            &job_id,
            "ocr_done",
            "ai_in_progress",
            &Utc::now().to_rfc3339(),
        )? {
            warn!("Job {} left ocr_done concurrently, aborting run", job_id);
            return Ok(Outcome::Aborted);
        }

        let classification = self
            .classifier
            .classify(&text, &lang)
            .instrument(info_span!("classify"))
            .await?;

        let fields = projector::project_fields(&classification);
        let summary = classification
            .summary
            .clone()
            .unwrap_or_else(|| projector::summary_fallback(&classification));

        let landed = job_repo::complete_ready(
            &self.db,
            &job_id,
            classification.category.as_str(),
            &classification.raw.to_string(),
            &fields.to_string(),
            &summary,
            &Utc::now().to_rfc3339(),
        )?;
        if !landed {
            warn!("Job {} left ai_in_progress concurrently, aborting run", job_id);
            return Ok(Outcome::Aborted);
        }

        Ok(Outcome::Ready(classification.category.as_str().to_string()))
    }
}

/// Maps a pipeline failure to its stable client-facing code. Typed
/// provider conditions map directly; free-text provider messages go
/// through the ordered normalization rules; everything else is a generic
/// processing failure.
fn failure_code(err: &PipelineError) -> ErrorCode {
    match err {
        PipelineError::Provider(ProviderError::NoText) => ErrorCode::NoTextDetected,
        PipelineError::Provider(ProviderError::ContentPolicy(_)) => {
            ErrorCode::InappropriateContent
        }
        PipelineError::Provider(ProviderError::Status { message, .. }) => {
            taxonomy::normalize(message)
        }
        PipelineError::Provider(ProviderError::InvalidResponse(message)) => {
            taxonomy::normalize(message)
        }
        _ => ErrorCode::ProcessingFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classification;
    use crate::db::job_repo::JobRow;
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExtractor {
        result: Result<String, ()>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextExtractor for FakeExtractor {
        async fn extract_text(&self, _image: &[u8]) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.result {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(ProviderError::NoText),
            }
        }
    }

    struct FakeClassifier {
        payload: serde_json::Value,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Classifier for FakeClassifier {
        async fn classify(&self, _text: &str, _lang: &str) -> Result<Classification, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Classification::from_provider_json(self.payload.clone())
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
        }
    }

    fn sample_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([10, 20, 30]));
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn received_job(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            owner_id: "u1".to_string(),
            status: "received".to_string(),
            source: "picker".to_string(),
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
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn pipeline_with(
        db: &Database,
        extractor: FakeExtractor,
        classifier: FakeClassifier,
    ) -> JobPipeline {
        JobPipeline::new(
            db.clone(),
            Arc::new(extractor),
            Arc::new(classifier),
            PreprocessConfig::default(),
            ThumbnailConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_happy_path_reaches_ready() {
        let db = Database::open_in_memory().unwrap();
        job_repo::insert(&db, &received_job("hp-1")).unwrap();

        let classifier_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline_with(
            &db,
            FakeExtractor {
                result: Ok("Meeting with Sarah at 3pm".to_string()),
                calls: AtomicUsize::new(0),
            },
            FakeClassifier {
                payload: json!({
                    "type": "event",
                    "title": "Meeting with Sarah",
                    "event": {"date": "2025-01-10", "location": "Cairo"}
                }),
                calls: Arc::clone(&classifier_calls),
            },
        );

        pipeline
            .run(JobInput {
                job_id: "hp-1".to_string(),
                owner_id: "u1".to_string(),
                image: sample_png(),
                want_thumb: false,
                lang: "en".to_string(),
            })
            .await;

        let row = job_repo::find_by_id(&db, "hp-1").unwrap().unwrap();
        assert_eq!(row.status, "ready");
        assert_eq!(row.item_type.as_deref(), Some("event"));
        assert_eq!(row.ocr_text, "Meeting with Sarah at 3pm");
        let fields: serde_json::Value = serde_json::from_str(row.fields.as_deref().unwrap()).unwrap();
        assert_eq!(fields["date"], "2025-01-10");
        assert_eq!(fields["location"], "Cairo");
        assert!(row.summary.is_some());
        assert_eq!(classifier_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_text_fails_without_classification() {
        let db = Database::open_in_memory().unwrap();
        job_repo::insert(&db, &received_job("nt-1")).unwrap();

        let classifier_calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline_with(
            &db,
            FakeExtractor {
                result: Err(()),
                calls: AtomicUsize::new(0),
            },
            FakeClassifier {
                payload: json!({"type": "note", "title": "unused"}),
                calls: Arc::clone(&classifier_calls),
            },
        );

        pipeline
            .run(JobInput {
                job_id: "nt-1".to_string(),
                owner_id: "u1".to_string(),
                image: sample_png(),
                want_thumb: false,
                lang: "en".to_string(),
            })
            .await;

        let row = job_repo::find_by_id(&db, "nt-1").unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_code.as_deref(), Some("no_text_detected"));
        assert_eq!(classifier_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_processing() {
        let db = Database::open_in_memory().unwrap();
        job_repo::insert(&db, &received_job("bad-1")).unwrap();

        let pipeline = pipeline_with(
            &db,
            FakeExtractor {
                result: Ok("text".to_string()),
                calls: AtomicUsize::new(0),
            },
            FakeClassifier {
                payload: json!({"type": "note", "title": "unused"}),
                calls: Arc::new(AtomicUsize::new(0)),
            },
        );

        pipeline
            .run(JobInput {
                job_id: "bad-1".to_string(),
                owner_id: "u1".to_string(),
                image: b"not an image".to_vec(),
                want_thumb: false,
                lang: "en".to_string(),
            })
            .await;

        let row = job_repo::find_by_id(&db, "bad-1").unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_code.as_deref(), Some("processing_failed"));
    }

    #[tokio::test]
    async fn test_thumbnail_requested_is_stored() {
        let db = Database::open_in_memory().unwrap();
        job_repo::insert(&db, &received_job("th-1")).unwrap();

        let pipeline = pipeline_with(
            &db,
            FakeExtractor {
                result: Ok("note text".to_string()),
                calls: AtomicUsize::new(0),
            },
            FakeClassifier {
                payload: json!({"type": "note", "title": "Note"}),
                calls: Arc::new(AtomicUsize::new(0)),
            },
        );

        pipeline
            .run(JobInput {
                job_id: "th-1".to_string(),
                owner_id: "u1".to_string(),
                image: sample_png(),
                want_thumb: true,
                lang: "en".to_string(),
            })
            .await;

        let row = job_repo::find_by_id(&db, "th-1").unwrap().unwrap();
        assert_eq!(row.status, "ready");
        assert!(row.thumb.is_some());
    }

    #[tokio::test]
    async fn test_run_on_terminal_job_aborts_untouched() {
        let db = Database::open_in_memory().unwrap();
        let mut job = received_job("term-1");
        job.status = "ready".to_string();
        job.fields = Some("{}".to_string());
        job_repo::insert(&db, &job).unwrap();

        let pipeline = pipeline_with(
            &db,
            FakeExtractor {
                result: Ok("text".to_string()),
                calls: AtomicUsize::new(0),
            },
            FakeClassifier {
                payload: json!({"type": "note", "title": "Note"}),
                calls: Arc::new(AtomicUsize::new(0)),
            },
        );

        pipeline
            .run(JobInput {
                job_id: "term-1".to_string(),
                owner_id: "u1".to_string(),
                image: sample_png(),
                want_thumb: false,
                lang: "en".to_string(),
            })
            .await;

        let row = job_repo::find_by_id(&db, "term-1").unwrap().unwrap();
        assert_eq!(row.status, "ready");
        assert!(row.error_code.is_none());
    }

    #[test]
    fn test_failure_code_mapping() {
        assert_eq!(
            failure_code(&PipelineError::Provider(ProviderError::NoText)),
            ErrorCode::NoTextDetected
        );
        assert_eq!(
            failure_code(&PipelineError::Provider(ProviderError::ContentPolicy(
                "blocked".to_string()
            ))),
            ErrorCode::InappropriateContent
        );
        assert_eq!(
            failure_code(&PipelineError::Provider(ProviderError::Status {
                status: 400,
                message: "image violates content policy".to_string(),
            })),
            ErrorCode::InappropriateContent
        );
        assert_eq!(
            failure_code(&PipelineError::Media(MediaError::UnsupportedFormat)),
            ErrorCode::ProcessingFailed
        );
        assert_eq!(
            failure_code(&PipelineError::Task("join".to_string())),
            ErrorCode::ProcessingFailed
        );
    }
}
