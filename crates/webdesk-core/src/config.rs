//! Client configuration.
//!
//! `ClientConfig` carries everything the HTTP client and the auth operations
//! need to know about the backend: where it lives, how long to wait, which
//! platform tags to send and which body `code` means success.
//!
//! Values default to a local development backend and can be overridden from
//! `WEBDESK_*` environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

/// Default backend base URL
const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

/// HTTP request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Platform tag sent with every request and merged into auth payloads
const DEFAULT_PLATFORM: &str = "web";

/// Body `code` value the backend uses for success
const DEFAULT_SUCCESS_CODE: &str = "200";

const ENV_BASE_URL: &str = "WEBDESK_API_URL";
const ENV_TIMEOUT_SECS: &str = "WEBDESK_TIMEOUT_SECS";
const ENV_PLATFORM: &str = "WEBDESK_PLATFORM";
const ENV_SUCCESS_CODE: &str = "WEBDESK_SUCCESS_CODE";

/// Paths of the auth endpoints, relative to the base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub profile: String,
    pub send_code: String,
    pub reset_password: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            profile: "/user/profile".to_string(),
            send_code: "/auth/send-code".to_string(),
            reset_password: "/auth/reset-password".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub platform: String,
    pub app_version: String,
    pub success_code: String,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            platform: DEFAULT_PLATFORM.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            success_code: DEFAULT_SUCCESS_CODE.to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults with any `WEBDESK_*` environment overrides applied
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `WEBDESK_*` environment overrides on top of this config
    pub fn with_env_overrides(mut self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_TIMEOUT_SECS))?;
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(platform) = lookup(ENV_PLATFORM) {
            self.platform = platform;
        }
        if let Some(code) = lookup(ENV_SUCCESS_CODE) {
            self.success_code = code;
        }
        debug!(base_url = %self.base_url, timeout_secs = self.timeout.as_secs(), "Client config resolved");
        Ok(())
    }

    /// Join a path onto the base URL without doubling slashes.
    /// Absolute URLs are returned unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
