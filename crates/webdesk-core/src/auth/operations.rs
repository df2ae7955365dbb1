//! Account operations built on the HTTP client.
//!
//! Every operation merges the caller's fields with the platform metadata,
//! sends them through `HttpClient`, and hands back a `NormalizedResponse`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api::{ApiError, HttpClient, NormalizedResponse};
use crate::config::Endpoints;

use super::SessionStore;

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Verification code, when the backend requires one to register
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Register,
    ResetPassword,
    Login,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCodeRequest {
    /// Phone number or email address the code is sent to
    pub target: String,
    pub purpose: CodePurpose,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub target: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
    #[serde(rename = "userInfo", alias = "user_info", default)]
    user_info: Option<Value>,
}

pub struct AuthApi {
    client: HttpClient,
}

impl AuthApi {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn session(&self) -> &SessionStore {
        self.client.session()
    }

    fn endpoints(&self) -> &Endpoints {
        &self.client.config().endpoints
    }

    /// Caller fields plus `platform` and `clientVersion`. The metadata wins on
    /// a key clash.
    fn payload<B: Serialize>(&self, fields: &B) -> Result<Value, ApiError> {
        let mut map = match serde_json::to_value(fields) {
            Ok(Value::Object(map)) => map,
            Ok(Value::Null) => Map::new(),
            Ok(_) => {
                return Err(ApiError::Configuration(
                    "request fields must be a JSON object".into(),
                ))
            }
            Err(e) => return Err(ApiError::Configuration(e.to_string())),
        };
        let config = self.client.config();
        map.insert("platform".into(), Value::String(config.platform.clone()));
        map.insert("clientVersion".into(), Value::String(config.app_version.clone()));
        Ok(Value::Object(map))
    }

    /// Log in and persist the session, expiring 24 hours from the call time.
    pub async fn login(&self, request: &LoginRequest) -> NormalizedResponse {
        let outcome = self.try_login(request).await;
        report("login", &outcome);
        outcome.into()
    }

    async fn try_login(&self, request: &LoginRequest) -> Result<Value, ApiError> {
        let issued_at = self.session().now_millis();
        let payload = self.payload(request)?;
        let data = self.client.post(&self.endpoints().login, &payload).await?;

        let login: LoginData = serde_json::from_value(data.clone())
            .map_err(|e| ApiError::InvalidResponse(format!("login response: {}", e)))?;
        if login.token.is_empty() {
            return Err(ApiError::InvalidResponse("login response has an empty token".into()));
        }

        self.session()
            .start(login.token, login.user_info, issued_at)
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        info!(username = %request.username, "Logged in");
        Ok(data)
    }

    pub async fn register(&self, request: &RegisterRequest) -> NormalizedResponse {
        let outcome = async {
            let payload = self.payload(request)?;
            self.client.post(&self.endpoints().register, &payload).await
        }
        .await;
        report("register", &outcome);
        outcome.into()
    }

    /// Fetch the current user's profile. A locally expired session fails with
    /// `expired` before anything is sent.
    pub async fn fetch_profile(&self) -> NormalizedResponse {
        let outcome = self.try_fetch_profile().await;
        report("fetch_profile", &outcome);
        outcome.into()
    }

    async fn try_fetch_profile(&self) -> Result<Value, ApiError> {
        if self.session().expire_if_stale() {
            return Err(ApiError::Expired);
        }
        let params = self.payload(&Value::Null)?;
        let profile = self.client.get(&self.endpoints().profile, Some(params)).await?;

        if profile.is_object() {
            if let Err(e) = self.session().set_user_info(&profile) {
                warn!(error = %e, "Failed to store fetched profile");
            }
        }
        Ok(profile)
    }

    pub async fn send_verification_code(&self, request: &VerificationCodeRequest) -> NormalizedResponse {
        let outcome = async {
            let payload = self.payload(request)?;
            self.client.post(&self.endpoints().send_code, &payload).await
        }
        .await;
        report("send_verification_code", &outcome);
        outcome.into()
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> NormalizedResponse {
        let outcome = async {
            let payload = self.payload(request)?;
            self.client.post(&self.endpoints().reset_password, &payload).await
        }
        .await;
        report("reset_password", &outcome);
        outcome.into()
    }

    /// Drop the local session
    pub fn logout(&self) -> NormalizedResponse {
        let outcome = self
            .session()
            .clear()
            .map(|_| Value::Null)
            .map_err(|e| ApiError::Storage(e.to_string()));
        report("logout", &outcome);
        outcome.into()
    }
}

fn report(operation: &str, outcome: &Result<Value, ApiError>) {
    match outcome {
        Ok(_) => debug!(operation, "Auth operation succeeded"),
        Err(e) => warn!(operation, code = %e.code(), error = %e, "Auth operation failed"),
    }
}
