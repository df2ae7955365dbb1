use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Every failure the client can produce. Call sites never see a raw
/// transport error; they get one of these, which converts to the
/// normalized `{success: false, message, code}` shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error, please check your connection")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unauthorized, please log in again")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Server error, please try again later")]
    ServerError,

    #[error("{message}")]
    Business { message: String, code: Option<String> },

    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Session expired, please log in again")]
    Expired,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to save session: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

const FORBIDDEN_MESSAGE: &str = "Access denied";
const GENERIC_FAILURE_MESSAGE: &str = "Request failed";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Classify a non-2xx response. `body` is the parsed JSON body, if any.
    pub fn from_status(status: StatusCode, body: Option<&Value>) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(
                body.and_then(body_message)
                    .unwrap_or_else(|| FORBIDDEN_MESSAGE.to_string()),
            ),
            404 => ApiError::NotFound,
            500 => ApiError::ServerError,
            other => ApiError::Http {
                status: other,
                message: body
                    .and_then(body_message)
                    .unwrap_or_else(|| format!("{} (status {})", GENERIC_FAILURE_MESSAGE, other)),
                code: body.and_then(body_code),
            },
        }
    }

    /// A 2xx body that reported failure
    pub fn business(body: &Value) -> Self {
        ApiError::Business {
            message: body_message(body).unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            code: body_code(body),
        }
    }

    /// Stable machine-readable code for the normalized response
    pub fn code(&self) -> String {
        match self {
            ApiError::Network(_) => "network_error".to_string(),
            ApiError::Timeout => "timeout".to_string(),
            ApiError::Unauthorized => "unauthorized".to_string(),
            ApiError::Forbidden(_) => "forbidden".to_string(),
            ApiError::NotFound => "not_found".to_string(),
            ApiError::ServerError => "server_error".to_string(),
            ApiError::Business { code, .. } => {
                code.clone().unwrap_or_else(|| "business_error".to_string())
            }
            ApiError::Http { status, code, .. } => {
                code.clone().unwrap_or_else(|| format!("http_{}", status))
            }
            ApiError::Expired => "expired".to_string(),
            ApiError::InvalidResponse(_) => "invalid_response".to_string(),
            ApiError::Storage(_) => "storage_error".to_string(),
            ApiError::Configuration(_) => "configuration".to_string(),
        }
    }

    /// The caller should drop back to the login view
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::Expired)
    }
}

/// `message`, falling back to `msg`
pub(crate) fn body_message(body: &Value) -> Option<String> {
    ["message", "msg"]
        .iter()
        .filter_map(|key| body.get(*key))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

/// `code` as a string, whether the backend sent a number or a string
pub(crate) fn body_code(body: &Value) -> Option<String> {
    match body.get("code")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
