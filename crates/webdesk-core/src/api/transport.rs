//! The base transport the client wraps.
//!
//! `Transport` is the seam between the interceptor pipeline and the network:
//! it takes a fully-intercepted `RequestEnvelope` and either returns whatever
//! status and body came back, or says why nothing came back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::request::{Payload, RequestEnvelope, UploadPart};
use super::ApiError;

/// A response that made it back, successful or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// No response was received
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("no response received: {0}")]
    Network(String),

    #[error("request could not be built: {0}")]
    Build(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => ApiError::Timeout,
            TransportError::Network(detail) => ApiError::Network(detail),
            TransportError::Build(detail) => ApiError::Configuration(detail),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: RequestEnvelope) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Configuration(e.to_string()))?;
        Ok(Self { client })
    }

    /// Share an existing connection pool
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }

    fn multipart_form(parts: Vec<UploadPart>) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for upload in parts {
            let mut part = Part::bytes(upload.data);
            if let Some(file_name) = upload.file_name {
                part = part.file_name(file_name);
            }
            if let Some(content_type) = upload.content_type {
                part = part
                    .mime_str(&content_type)
                    .map_err(|e| TransportError::Build(e.to_string()))?;
            }
            form = form.part(upload.field, part);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: RequestEnvelope) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder = match request.body {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Multipart(parts) => builder.multipart(Self::multipart_form(parts)?),
        };

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status();
        let body = response.text().await.map_err(Self::classify)?;
        debug!(status = status.as_u16(), bytes = body.len(), "Response received");

        Ok(RawResponse { status, body })
    }
}
