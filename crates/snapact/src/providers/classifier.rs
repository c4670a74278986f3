//! HTTP client for the classification capability.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{sanitize_error_body, Classifier, ProviderError};
use crate::classify::Classification;

/// Classification over HTTP: POSTs the extracted text plus the caller's
/// preferred output language and folds the JSON answer into a validated
/// [`Classification`].
pub struct HttpClassifier {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpClassifier {
    pub fn new(client: Client, url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            url,
            api_key,
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str, lang: &str) -> Result<Classification, ProviderError> {
        let body = json!({
            "text": text,
            "lang": lang,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let detail = sanitize_error_body(&raw);
            let lowered = detail.to_lowercase();
            if lowered.contains("content policy") || lowered.contains("inappropriate") {
                return Err(ProviderError::ContentPolicy(detail));
            }
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: detail,
            });
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Classification::from_provider_json(raw)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}
