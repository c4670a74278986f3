//! Capability seams for the two external analyses.
//!
//! The pipeline depends on these traits, not on concrete providers, so
//! tests substitute fakes and the HTTP clients stay swappable.

pub mod classifier;
pub mod ocr;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::classify::Classification;

/// Errors from a capability provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The OCR capability found no readable text. A distinguishable
    /// condition, not a transport failure: the pipeline maps it straight
    /// to `no_text_detected` and skips classification.
    #[error("no text detected in image")]
    NoText,

    /// The provider refused the input on content-policy grounds.
    #[error("content policy rejection: {0}")]
    ContentPolicy(String),

    /// The provider answered with a non-success HTTP status.
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never completed.
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered 200 with a body we cannot use.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Extracts dense text from an image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Returns the extracted text, or [`ProviderError::NoText`] when the
    /// image contains none.
    async fn extract_text(&self, image: &[u8]) -> Result<String, ProviderError>;
}

/// Classifies extracted text into one of the item categories.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// `lang` is the caller's preferred output language for titles and
    /// summaries.
    async fn classify(&self, text: &str, lang: &str) -> Result<Classification, ProviderError>;
}

/// Builds the HTTP capability clients from configuration. Called once at
/// process start; the clients are shared across all jobs.
pub fn build_http_providers(
    config: &crate::config::ProvidersConfig,
) -> (Arc<dyn TextExtractor>, Arc<dyn Classifier>) {
    let client = reqwest::Client::new();
    let extractor: Arc<dyn TextExtractor> = Arc::new(ocr::HttpTextExtractor::new(
        client.clone(),
        config.ocr_url.clone(),
        config.api_key.clone(),
    ));
    let classifier: Arc<dyn Classifier> = Arc::new(classifier::HttpClassifier::new(
        client,
        config.classifier_url.clone(),
        config.api_key.clone(),
    ));
    (extractor, classifier)
}

/// Maximum length for provider error bodies kept in messages, to prevent
/// log flooding.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Truncates a provider error body to a reasonable length.
pub(crate) fn sanitize_error_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let cut: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated)", cut)
    } else {
        body.to_string()
    }
}
