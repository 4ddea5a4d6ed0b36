//! Wire format and HTTP transport for the text-generation endpoint.
//!
//! One operation: POST a JSON [`GenerateRequest`], read back a JSON
//! [`GenerateResponse`]. The endpoint is a thin proxy in front of a
//! multimodal model; it accepts an optional inline image.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    /// Raw base64 image payload (no data-URL prefix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl GenerateRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image_data: None,
            mime_type: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image_data: String, mime_type: &str) -> Self {
        Self {
            prompt: prompt.into(),
            image_data: Some(image_data),
            mime_type: Some(mime_type.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub text: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
    #[error("unreadable response body: {0}")]
    Body(String),
}

/// A synchronous request/response channel to the generation service.
pub trait Transport: Send + Sync {
    fn post(&self, request: &GenerateRequest) -> Result<GenerateResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn post(&self, request: &GenerateRequest) -> Result<GenerateResponse, TransportError> {
        (**self).post(request)
    }
}

/// [`Transport`] over HTTP using a blocking `reqwest` client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: &GenerateRequest) -> Result<GenerateResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let content = response
            .text()
            .map_err(|e| TransportError::Body(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| TransportError::Body(e.to_string()))
    }
}
