//! HTTP client for the keyword extraction service.
//!
//! The service turns free text into a fixed-size keyword vector plus the
//! catalog keywords it selected:
//!
//! ```text
//! POST {base_url}/extract
//! {"text": "...", "context_type": "place" | "user", "mbti": "INFP"}
//!
//! 200 {"vector": [..100 floats..],
//!      "selected_keywords": [{"keyword_id": 1, "keyword": "cozy", "confidence": 0.8}],
//!      "model_name": "kw-extractor", "model_version": "3"}
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info, warn};

use mohe_core::defaults::{EXTRACTION_TIMEOUT_SECS, EXTRACTION_URL, VECTOR_DIMENSION};
use mohe_core::{Error, ExtractionContext, ExtractionResult, KeywordExtractor, Result};

/// Extraction client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Expected vector length.
    pub dimension: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: EXTRACTION_URL.to_string(),
            timeout_secs: EXTRACTION_TIMEOUT_SECS,
            dimension: VECTOR_DIMENSION,
        }
    }
}

impl ExtractionConfig {
    /// Reads `MOHE_EXTRACTION_URL` and `MOHE_EXTRACTION_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("MOHE_EXTRACTION_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.base_url);
        let timeout_secs = std::env::var("MOHE_EXTRACTION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.timeout_secs);
        Self {
            base_url,
            timeout_secs,
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    context_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mbti: Option<&'a str>,
}

/// [`KeywordExtractor`] backed by the extraction service.
#[derive(Debug, Clone)]
pub struct HttpKeywordExtractor {
    client: Client,
    config: ExtractionConfig,
    model_name: String,
}

impl HttpKeywordExtractor {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "extraction",
            base_url = %config.base_url,
            timeout_secs = config.timeout_secs,
            "Initializing keyword extraction client"
        );

        Ok(Self {
            client,
            model_name: format!("extraction@{}", config.base_url),
            config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ExtractionConfig::from_env())
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// True when the service answers its health endpoint.
    pub async fn health_check(&self) -> Result<bool> {
        match self
            .client
            .get(self.endpoint("health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl KeywordExtractor for HttpKeywordExtractor {
    async fn extract(&self, text: &str, context: &ExtractionContext) -> Result<ExtractionResult> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("extraction text is empty".to_string()));
        }

        let start = Instant::now();
        let request = ExtractRequest {
            text,
            context_type: context.context_type(),
            mbti: context.mbti(),
        };

        let response = self
            .client
            .post(self.endpoint("extract"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Extraction request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "inference",
                component = "extraction",
                status = status.as_u16(),
                "Extraction service returned an error"
            );
            return Err(status_error(status, &body));
        }

        let result: ExtractionResult = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse extraction response: {}", e)))?;

        if result.vector.len() != self.config.dimension {
            return Err(Error::DimensionMismatch {
                left: result.vector.len(),
                right: self.config.dimension,
            });
        }

        debug!(
            subsystem = "inference",
            component = "extraction",
            op = "extract",
            context_type = context.context_type(),
            result_count = result.selected_keywords.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Keywords extracted"
        );
        Ok(result)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Server errors are transient, client errors are not.
fn status_error(status: StatusCode, body: &str) -> Error {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::Embedding(format!("Extraction service returned {}: {}", status, body))
    } else {
        Error::InvalidInput(format!("Extraction service rejected request {}: {}", status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_missing_mbti() {
        let request = ExtractRequest {
            text: "quiet cafe",
            context_type: "place",
            mbti: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["context_type"], "place");
        assert!(json.get("mbti").is_none());
    }

    #[test]
    fn test_status_error_classification() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = HttpKeywordExtractor::new(
            ExtractionConfig::default().with_base_url("http://localhost:9000/"),
        )
        .unwrap();
        assert_eq!(client.endpoint("extract"), "http://localhost:9000/extract");
    }

    #[test]
    fn test_config_defaults() {
        let config = ExtractionConfig::default();
        assert_eq!(config.base_url, EXTRACTION_URL);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.dimension, 100);
    }
}
