//! Extraction / alignment gateway client.
//!
//! DESIGN
//! ======
//! The vision model and the contour-based alignment both run in a sidecar
//! gateway that shares the filesystem with this process, so requests carry
//! an image path rather than image bytes. The gateway speaks JSON:
//!
//! - `POST {base}/v1/extract` `{image_path, model}` → `{text}`: raw model
//!   output, which may wrap the draft in prose or markdown fences.
//! - `POST {base}/v1/align` `{image_path, id, kind, geom}` → an [`Alignment`].
//!
//! [`AssistService`] is the seam the workers call through, so tests swap in
//! a mock. Response parsing is kept in pure functions for the same reason.

#[cfg(test)]
#[path = "gateway_test.rs"]
mod gateway_test;

use std::path::Path;
use std::time::Duration;

use annosync::ErrorCode;
use annosync::doc::{AnnotationRecord, Fields};
use annosync::event::Alignment;

use crate::config::ServiceConfig;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request never got a response.
    #[error("gateway request failed: {0}")]
    Request(String),

    /// The gateway answered with a non-success status.
    #[error("gateway returned status {status}: {body}")]
    Response { status: u16, body: String },

    /// The response body was not the expected JSON.
    #[error("gateway response parse failed: {0}")]
    Parse(String),

    /// The record cannot be aligned (no kind or no geometry).
    #[error("record {0} cannot be aligned")]
    NotAlignable(String),
}

impl ErrorCode for ServiceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Request(_) => "E_GATEWAY_REQUEST",
            Self::Response { .. } => "E_GATEWAY_RESPONSE",
            Self::Parse(_) => "E_GATEWAY_PARSE",
            Self::NotAlignable(_) => "E_NOT_ALIGNABLE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// SERVICE TRAIT
// =============================================================================

/// What the workers need from the gateway. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AssistService: Send + Sync {
    /// Ask the vision model for a draft of the image. Returns the raw text.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the call fails or the reply is malformed.
    async fn extract(&self, image: &Path, model: &str) -> Result<String, ServiceError>;

    /// Refine one record's placement against the image.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] if the record has no kind or geometry, the
    /// call fails, or the reply is malformed.
    async fn align(&self, image: &Path, record: &AnnotationRecord) -> Result<Alignment, ServiceError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpAssist {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpAssist {
    /// Build a client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::HttpClientBuild`] if reqwest rejects the setup.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ServiceError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone(), api_key: config.api_key.clone() })
    }

    async fn post<B: serde::Serialize + Sync>(&self, path: &str, body: &B) -> Result<String, ServiceError> {
        let url = endpoint(&self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(ServiceError::Response { status, body: text });
        }
        tracing::debug!(%url, status, bytes = text.len(), "gateway replied");
        Ok(text)
    }
}

#[async_trait::async_trait]
impl AssistService for HttpAssist {
    async fn extract(&self, image: &Path, model: &str) -> Result<String, ServiceError> {
        let image_path = image.to_string_lossy();
        let body = ExtractRequest { image_path: &image_path, model };
        let text = self.post("/v1/extract", &body).await?;
        parse_extract_response(&text)
    }

    async fn align(&self, image: &Path, record: &AnnotationRecord) -> Result<Alignment, ServiceError> {
        let id = record.id().unwrap_or_default();
        let (Some(kind), Some(geom)) = (record.kind_name(), record.geom()) else {
            return Err(ServiceError::NotAlignable(id.to_string()));
        };
        let image_path = image.to_string_lossy();
        let body = AlignRequest { image_path: &image_path, id, kind, geom };
        let text = self.post("/v1/align", &body).await?;
        parse_align_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ExtractRequest<'a> {
    image_path: &'a str,
    model: &'a str,
}

#[derive(serde::Serialize)]
struct AlignRequest<'a> {
    image_path: &'a str,
    id: &'a str,
    kind: &'a str,
    geom: &'a Fields,
}

#[derive(serde::Deserialize)]
struct ExtractResponse {
    text: String,
}

// =============================================================================
// PARSING
// =============================================================================

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn parse_extract_response(json: &str) -> Result<String, ServiceError> {
    let reply: ExtractResponse = serde_json::from_str(json).map_err(|e| ServiceError::Parse(e.to_string()))?;
    if reply.text.trim().is_empty() {
        return Err(ServiceError::Parse("model returned no text".into()));
    }
    Ok(reply.text)
}

fn parse_align_response(json: &str) -> Result<Alignment, ServiceError> {
    let alignment: Alignment = serde_json::from_str(json).map_err(|e| ServiceError::Parse(e.to_string()))?;
    let finite = [alignment.x, alignment.y, alignment.w, alignment.h]
        .iter()
        .all(|v| v.is_finite());
    if !finite || alignment.w <= 0.0 || alignment.h <= 0.0 {
        return Err(ServiceError::Parse("alignment box is empty or not finite".into()));
    }
    Ok(alignment)
}
