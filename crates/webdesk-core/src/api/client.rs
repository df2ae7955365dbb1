//! HTTP client for the webdesk backend.
//!
//! `HttpClient` runs every call through the same pipeline: caller options,
//! request interceptors, the transport, body unwrapping and status
//! classification, then response interceptors. Whatever happens, the caller
//! gets `Ok(data)` or an `ApiError`.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::SessionStore;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;

use super::error::body_code;
use super::interceptor::{
    BearerToken, CacheBuster, PlatformHeaders, RequestInterceptor, ResponseInterceptor,
    SessionTeardown, UnauthorizedHandler,
};
use super::request::{query_pairs, Payload, RequestEnvelope, RequestOptions, UploadPart};
use super::transport::{RawResponse, ReqwestTransport, Transport};
use super::ApiError;

/// Clone is cheap - the transport, session storage and interceptors are all
/// behind `Arc`.
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    session: SessionStore,
    request_interceptors: Arc<Vec<Box<dyn RequestInterceptor>>>,
    response_interceptors: Arc<Vec<Box<dyn ResponseInterceptor>>>,
}

impl HttpClient {
    /// Client with the default pipeline over a reqwest transport
    pub fn new(config: ClientConfig, session: SessionStore) -> Result<Self, ApiError> {
        Self::builder(config, session).build()
    }

    pub fn builder(config: ClientConfig, session: SessionStore) -> HttpClientBuilder {
        HttpClientBuilder {
            config,
            session,
            transport: None,
            clock: None,
            on_unauthorized: None,
            extra_request: Vec::new(),
            extra_response: Vec::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let mut request = RequestEnvelope::new(method, self.config.url(path));
        if request.is_read() {
            if let Payload::Json(ref params) = payload {
                request.query = query_pairs(params);
            }
        } else {
            request.body = payload;
        }
        options.apply(&mut request);

        for interceptor in self.request_interceptors.iter() {
            interceptor.on_request(&mut request);
        }

        let method = request.method.clone();
        let url = request.url.clone();
        debug!(%method, %url, "Sending request");

        let outcome = match self.transport.execute(request).await {
            Ok(raw) => self.unwrap_response(raw),
            Err(e) => {
                warn!(%method, %url, error = %e, "No response received");
                Err(ApiError::from(e))
            }
        };

        let outcome = self
            .response_interceptors
            .iter()
            .fold(outcome, |outcome, interceptor| interceptor.on_response(outcome));

        match outcome {
            Ok(ref _data) => debug!(%method, %url, "Request succeeded"),
            Err(ref e) => warn!(%method, %url, code = %e.code(), error = %e, "Request failed"),
        }
        outcome
    }

    pub async fn get(&self, path: &str, params: Option<Value>) -> Result<Value, ApiError> {
        let payload = params.map(Payload::Json).unwrap_or_default();
        self.send(Method::GET, path, payload, RequestOptions::default()).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        self.send(Method::POST, path, json_payload(body)?, RequestOptions::default())
            .await
    }

    pub async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        self.send(Method::PUT, path, json_payload(body)?, RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(Method::DELETE, path, Payload::Empty, RequestOptions::default())
            .await
    }

    /// Multipart POST
    pub async fn upload(&self, path: &str, parts: Vec<UploadPart>) -> Result<Value, ApiError> {
        self.send(Method::POST, path, Payload::Multipart(parts), RequestOptions::default())
            .await
    }

    /// Turn a raw response into the call's data or a classified error
    fn unwrap_response(&self, raw: RawResponse) -> Result<Value, ApiError> {
        let body: Option<Value> = if raw.body.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&raw.body).ok()
        };

        if !raw.status.is_success() {
            debug!(
                status = raw.status.as_u16(),
                body = %ApiError::truncate_body(&raw.body),
                "Error response"
            );
            return Err(ApiError::from_status(raw.status, body.as_ref()));
        }

        // An empty 2xx body carries no success indicator
        if raw.body.trim().is_empty() {
            return Err(ApiError::business(&Value::Null));
        }
        let Some(mut body) = body else {
            return Err(ApiError::InvalidResponse(format!(
                "expected a JSON body, got: {}",
                ApiError::truncate_body(&raw.body)
            )));
        };

        if self.is_success_envelope(&body) {
            Ok(body
                .as_object_mut()
                .and_then(|map| map.remove("data"))
                .unwrap_or(Value::Null))
        } else {
            Err(ApiError::business(&body))
        }
    }

    /// `code` equal to the success sentinel, or `success: true`
    fn is_success_envelope(&self, body: &Value) -> bool {
        let code_ok = body_code(body).is_some_and(|code| code == self.config.success_code);
        let flag_ok = body.get("success").and_then(Value::as_bool) == Some(true);
        code_ok || flag_ok
    }
}

fn json_payload<B: Serialize>(body: &B) -> Result<Payload, ApiError> {
    serde_json::to_value(body)
        .map(Payload::Json)
        .map_err(|e| ApiError::Configuration(format!("request body is not serializable: {}", e)))
}

pub struct HttpClientBuilder {
    config: ClientConfig,
    session: SessionStore,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    on_unauthorized: Option<UnauthorizedHandler>,
    extra_request: Vec<Box<dyn RequestInterceptor>>,
    extra_response: Vec<Box<dyn ResponseInterceptor>>,
}

impl HttpClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Time source for the cache buster
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn on_unauthorized(mut self, handler: UnauthorizedHandler) -> Self {
        self.on_unauthorized = Some(handler);
        self
    }

    /// Runs after the built-in request interceptors
    pub fn request_interceptor(mut self, interceptor: Box<dyn RequestInterceptor>) -> Self {
        self.extra_request.push(interceptor);
        self
    }

    /// Runs after the built-in response interceptors
    pub fn response_interceptor(mut self, interceptor: Box<dyn ResponseInterceptor>) -> Self {
        self.extra_response.push(interceptor);
        self
    }

    pub fn build(self) -> Result<HttpClient, ApiError> {
        if self.config.base_url.trim().is_empty() {
            return Err(ApiError::Configuration("base_url is required".into()));
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.config.timeout)?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let mut request_interceptors: Vec<Box<dyn RequestInterceptor>> = vec![
            Box::new(BearerToken::new(self.session.clone())),
            Box::new(PlatformHeaders::new(
                self.config.platform.clone(),
                self.config.app_version.clone(),
            )),
            Box::new(CacheBuster::new(clock)),
        ];
        request_interceptors.extend(self.extra_request);

        let mut response_interceptors: Vec<Box<dyn ResponseInterceptor>> = vec![Box::new(
            SessionTeardown::new(self.session.clone(), self.on_unauthorized),
        )];
        response_interceptors.extend(self.extra_response);

        Ok(HttpClient {
            config: Arc::new(self.config),
            transport,
            session: self.session,
            request_interceptors: Arc::new(request_interceptors),
            response_interceptors: Arc::new(response_interceptors),
        })
    }
}
