use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tracing::warn;

/// One part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadPart {
    pub fn file(field: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: Some(file_name.into()),
            content_type: None,
            data,
        }
    }

    pub fn text(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            file_name: None,
            content_type: None,
            data: value.into().into_bytes(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<UploadPart>),
}

/// An outgoing request as the interceptors see it.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Payload,
    pub timeout: Option<Duration>,
}

impl RequestEnvelope {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Payload::Empty,
            timeout: None,
        }
    }

    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }

    /// Set a header, skipping (and logging) values that are not valid header text.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, "Dropping header with invalid value"),
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Per-call extras supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn apply(self, request: &mut RequestEnvelope) {
        for (name, value) in self.headers {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => request.set_header(name, &value),
                Err(_) => warn!(header = %name, "Dropping header with invalid name"),
            }
        }
        if self.timeout.is_some() {
            request.timeout = self.timeout;
        }
    }
}

/// Flatten a JSON object into query pairs. Nulls are skipped, strings are
/// sent raw, everything else as its JSON text.
pub(crate) fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}
