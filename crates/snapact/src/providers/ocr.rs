//! HTTP client for the text-extraction capability.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{sanitize_error_body, ProviderError, TextExtractor};

/// Response body of the OCR endpoint.
#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: String,
}

/// Error body returned by the capability on rejections.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Text extraction over HTTP: POSTs the preprocessed image as base64 JSON
/// and expects `{"text": "..."}` back.
pub struct HttpTextExtractor {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpTextExtractor {
    pub fn new(client: Client, url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            url,
            api_key,
        }
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract_text(&self, image: &[u8]) -> Result<String, ProviderError> {
        let body = json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image),
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(classify_rejection(status.as_u16(), &raw));
        }

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        // The capability contract: absence of text is a distinguishable
        // condition, not a transport failure.
        if parsed.text.trim().is_empty() {
            return Err(ProviderError::NoText);
        }

        Ok(parsed.text)
    }
}

/// Maps a non-success OCR response to the matching provider error.
fn classify_rejection(status: u16, raw_body: &str) -> ProviderError {
    let parsed: Option<ProviderErrorBody> = serde_json::from_str(raw_body).ok();
    let detail = parsed
        .map(|b| if b.error.is_empty() { b.message } else { b.error })
        .unwrap_or_default();
    let detail = if detail.is_empty() {
        sanitize_error_body(raw_body)
    } else {
        detail
    };

    let lowered = detail.to_lowercase();
    if lowered.contains("no_text") || lowered.contains("no text") {
        ProviderError::NoText
    } else if lowered.contains("content policy") || lowered.contains("inappropriate") {
        ProviderError::ContentPolicy(detail)
    } else {
        ProviderError::Status {
            status,
            message: detail,
        }
    }
}
