//! HTTP client module for the webdesk backend.
//!
//! This module provides the `HttpClient`, which wraps a `Transport` with an
//! ordered pipeline of request and response interceptors and normalizes
//! every outcome into `Ok(data)` or an `ApiError`.
//!
//! The backend uses bearer token authentication; the token comes from the
//! `SessionStore` on every request.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use error::ApiError;
pub use interceptor::{RequestInterceptor, ResponseInterceptor, UnauthorizedHandler};
pub use request::{Payload, RequestEnvelope, RequestOptions, UploadPart};
pub use response::NormalizedResponse;
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};
