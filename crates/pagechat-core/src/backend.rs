use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::BackendError;
use crate::protocol::RelayRequest;

#[derive(Deserialize)]
struct AnswerMetadata {
    process_time: Option<f64>,
    url: Option<String>,
}

/// Health probe body returned by `GET /`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Client for the RAG backend.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the conversation and page URL, returning the answer text.
    pub async fn ask(&self, request: &RelayRequest) -> Result<String, BackendError> {
        let url = format!("{}/response/", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_detail(&text)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string()),
            });
        }

        let body: Value = response.json().await?;

        if let Some(metadata) = body.get("metadata") {
            if let Ok(metadata) = serde_json::from_value::<AnswerMetadata>(metadata.clone()) {
                tracing::debug!(
                    process_time = ?metadata.process_time,
                    url = ?metadata.url,
                    "backend answer metadata"
                );
            }
        }

        match body.get("answer").and_then(Value::as_str) {
            Some(answer) if !answer.is_empty() => Ok(answer.to_string()),
            _ => Err(BackendError::MissingAnswer),
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, BackendError> {
        let url = format!("{}/", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_detail(&text).unwrap_or_else(|| "health check failed".to_string()),
            });
        }

        Ok(response.json().await?)
    }
}

/// Pull a human-readable message out of an error body. The backend answers
/// errors as `{"detail": ...}` where detail is usually a string but may be a
/// list of validation errors.
fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(trimmed.to_string()),
        },
        _ => Some(trimmed.to_string()),
    }
}
