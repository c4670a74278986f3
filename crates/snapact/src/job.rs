//! Job domain types: status machine states and the client-facing view.

use serde::{Deserialize, Serialize};

use crate::db::job_repo::JobRow;
use crate::taxonomy::ErrorCode;

/// Pipeline status of a job. Transitions run strictly forward along
/// `Received -> OcrInProgress -> OcrDone -> AiInProgress -> Ready`, with
/// `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Received,
    OcrInProgress,
    OcrDone,
    AiInProgress,
    Ready,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::OcrInProgress => "ocr_in_progress",
            JobStatus::OcrDone => "ocr_done",
            JobStatus::AiInProgress => "ai_in_progress",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
        }
    }

    /// Parses a stored status string. Unknown values are reported and
    /// treated as `Received` so a corrupt row never looks terminal.
    pub fn parse(s: &str, job_id: &str) -> Self {
        match s {
            "received" => JobStatus::Received,
            "ocr_in_progress" => JobStatus::OcrInProgress,
            "ocr_done" => JobStatus::OcrDone,
            "ai_in_progress" => JobStatus::AiInProgress,
            "ready" => JobStatus::Ready,
            "failed" => JobStatus::Failed,
            other => {
                log::warn!(
                    "Unknown job status '{}' for job {}, defaulting to received",
                    other,
                    job_id
                );
                JobStatus::Received
            }
        }
    }

    /// Returns true for `Ready` and `Failed`; the pipeline never mutates a
    /// job past either.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the submitted image came from. Informational only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Share,
    Picker,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Share => "share",
            Source::Picker => "picker",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "share" => Source::Share,
            _ => Source::Picker,
        }
    }
}

/// Normalized error stored on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
}

/// Whether and how the user acted on the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub applied: bool,
    #[serde(rename = "type")]
    pub action_type: Option<String>,
    pub applied_at: Option<String>,
}

/// The owner-visible subset of a job record, as returned by the polling
/// API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub source: Source,
    pub ocr_text: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    pub is_favorite: bool,
    pub action: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobView {
    /// Builds the client view from a raw database row. JSON columns that
    /// fail to parse are dropped rather than failing the read.
    pub fn from_row(row: &JobRow) -> Self {
        let error = match (&row.error_code, &row.error_message) {
            (Some(code), message) => Some(JobError {
                code: ErrorCode::parse(code),
                message: message.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            job_id: row.id.clone(),
            status: JobStatus::parse(&row.status, &row.id),
            source: Source::parse(&row.source),
            ocr_text: row.ocr_text.clone(),
            item_type: row.item_type.clone(),
            classification: row
                .classification
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            fields: row
                .fields
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            summary: row.summary.clone(),
            thumb: row.thumb.clone(),
            is_favorite: row.is_favorite,
            action: ActionState {
                applied: row.action_applied,
                action_type: row.action_type.clone(),
                applied_at: row.action_applied_at.clone(),
            },
            error,
            created_at: row.created_at.clone(),
            updated_at: row.updated_at.clone(),
        }
    }
}
