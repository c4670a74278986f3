//! Stable error taxonomy surfaced to clients.
//!
//! Downstream capabilities fail with free-text messages; this module
//! normalizes them into a fixed set of codes so clients can branch on
//! machine-readable values instead of provider prose.

use serde::{Deserialize, Serialize};

/// Client-facing error codes. Wire names are stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingUserId,
    MissingImage,
    InvalidImage,
    MaintenanceMode,
    LimitReached,
    NoTextDetected,
    InappropriateContent,
    ProcessingFailed,
    NetworkError,
    JobNotFound,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingUserId => "missing_user_id",
            ErrorCode::MissingImage => "missing_image",
            ErrorCode::InvalidImage => "invalid_image",
            ErrorCode::MaintenanceMode => "maintenance_mode",
            ErrorCode::LimitReached => "limit_reached",
            ErrorCode::NoTextDetected => "no_text_detected",
            ErrorCode::InappropriateContent => "inappropriate_content",
            ErrorCode::ProcessingFailed => "processing_failed",
            ErrorCode::NetworkError => "network_error",
            ErrorCode::JobNotFound => "job_not_found",
            ErrorCode::ServerError => "server_error",
        }
    }

    /// Parses a stored code string; unknown values collapse to
    /// `processing_failed`.
    pub fn parse(s: &str) -> Self {
        match s {
            "missing_user_id" => ErrorCode::MissingUserId,
            "missing_image" => ErrorCode::MissingImage,
            "invalid_image" => ErrorCode::InvalidImage,
            "maintenance_mode" => ErrorCode::MaintenanceMode,
            "limit_reached" => ErrorCode::LimitReached,
            "no_text_detected" => ErrorCode::NoTextDetected,
            "inappropriate_content" => ErrorCode::InappropriateContent,
            "processing_failed" => ErrorCode::ProcessingFailed,
            "network_error" => ErrorCode::NetworkError,
            "job_not_found" => ErrorCode::JobNotFound,
            "server_error" => ErrorCode::ServerError,
            _ => ErrorCode::ProcessingFailed,
        }
    }

    /// Codes for which a client retry (a fresh submission) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ProcessingFailed | ErrorCode::NetworkError | ErrorCode::MaintenanceMode
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered normalization rules, evaluated top to bottom. The first rule
/// whose pattern matches (case-insensitive substring) wins; anything
/// unmatched falls through to `processing_failed`.
///
/// The phrases come from the known failure messages of the OCR and
/// classification capabilities.
const RULES: &[(&[&str], ErrorCode)] = &[
    (
        &[
            "content policy",
            "inappropriate",
            "unsafe image",
            "safety system",
            "blocked by moderation",
        ],
        ErrorCode::InappropriateContent,
    ),
    (
        &[
            "no text",
            "no readable text",
            "text not found",
            "empty text",
            "nothing to read",
        ],
        ErrorCode::NoTextDetected,
    ),
];

/// Maps a free-text provider error message to a stable code.
pub fn normalize(raw: &str) -> ErrorCode {
    let lowered = raw.to_lowercase();
    for (patterns, code) in RULES {
        if patterns.iter().any(|p| lowered.contains(p)) {
            return *code;
        }
    }
    ErrorCode::ProcessingFailed
}
