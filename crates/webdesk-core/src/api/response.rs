use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiError;

/// The uniform envelope every caller receives, whatever the transport did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Set from `ApiError::requires_login`, never from the body's code
    #[serde(skip)]
    login_required: bool,
}

impl NormalizedResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            code: None,
            login_required: false,
        }
    }

    pub fn failure(error: &ApiError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(error.to_string()),
            code: Some(error.code()),
            login_required: error.requires_login(),
        }
    }

    /// True when the failure means the caller should show the login view
    pub fn requires_login(&self) -> bool {
        !self.success && self.login_required
    }
}

impl From<Result<Value, ApiError>> for NormalizedResponse {
    fn from(result: Result<Value, ApiError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }
}
