//! Request and response interceptors.
//!
//! The client runs request interceptors in order on every outgoing
//! `RequestEnvelope`, and folds every outcome through the response
//! interceptors in order. Only `SessionTeardown` has a side effect, and only
//! on `Unauthorized`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use reqwest::header::{HeaderName, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::SessionStore;
use crate::clock::Clock;

use super::request::RequestEnvelope;
use super::ApiError;

pub const PLATFORM_HEADER: HeaderName = HeaderName::from_static("x-platform");
pub const APP_VERSION_HEADER: HeaderName = HeaderName::from_static("x-app-version");

/// Query parameter carrying the cache-busting timestamp
pub const CACHE_BUSTER_PARAM: &str = "_t";

pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, request: &mut RequestEnvelope);
}

pub trait ResponseInterceptor: Send + Sync {
    fn on_response(&self, outcome: Result<Value, ApiError>) -> Result<Value, ApiError>;
}

/// Called after a 401 has torn the session down
pub type UnauthorizedHandler = Arc<dyn Fn() + Send + Sync>;

/// Attaches `Authorization: Bearer <token>` when the session holds an
/// unexpired token. An expired session is cleared instead.
pub struct BearerToken {
    session: SessionStore,
}

impl BearerToken {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }
}

impl RequestInterceptor for BearerToken {
    fn on_request(&self, request: &mut RequestEnvelope) {
        if let Some(token) = self.session.valid_token() {
            request.set_header(AUTHORIZATION, &format!("Bearer {}", token));
        }
    }
}

pub struct PlatformHeaders {
    platform: String,
    app_version: String,
}

impl PlatformHeaders {
    pub fn new(platform: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            app_version: app_version.into(),
        }
    }
}

impl RequestInterceptor for PlatformHeaders {
    fn on_request(&self, request: &mut RequestEnvelope) {
        request.set_header(PLATFORM_HEADER, &self.platform);
        request.set_header(APP_VERSION_HEADER, &self.app_version);
    }
}

/// Appends `_t=<millis>` to GETs.
///
/// Stamps are strictly increasing per instance: a second GET in the same
/// millisecond gets the previous stamp plus one.
pub struct CacheBuster {
    clock: Arc<dyn Clock>,
    last: AtomicI64,
}

impl CacheBuster {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: AtomicI64::new(i64::MIN),
        }
    }

    fn next_stamp(&self) -> i64 {
        let now = self.clock.now_millis();
        let bump = |prev: i64| now.max(prev.saturating_add(1));
        match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(bump(prev)))
        {
            Ok(prev) | Err(prev) => bump(prev),
        }
    }
}

impl RequestInterceptor for CacheBuster {
    fn on_request(&self, request: &mut RequestEnvelope) {
        if request.is_read() {
            request
                .query
                .push((CACHE_BUSTER_PARAM.to_string(), self.next_stamp().to_string()));
        }
    }
}

/// Clears the session on `Unauthorized` and notifies the shell
pub struct SessionTeardown {
    session: SessionStore,
    on_unauthorized: Option<UnauthorizedHandler>,
}

impl SessionTeardown {
    pub fn new(session: SessionStore, on_unauthorized: Option<UnauthorizedHandler>) -> Self {
        Self {
            session,
            on_unauthorized,
        }
    }
}

impl ResponseInterceptor for SessionTeardown {
    fn on_response(&self, outcome: Result<Value, ApiError>) -> Result<Value, ApiError> {
        if let Err(ApiError::Unauthorized) = outcome {
            warn!("Unauthorized response, clearing session");
            if let Err(e) = self.session.clear() {
                warn!(error = %e, "Failed to clear session after 401");
            }
            if let Some(ref handler) = self.on_unauthorized {
                debug!("Redirecting to login");
                handler();
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::auth::MemoryStorage;
    use crate::clock::ManualClock;

    #[test]
    fn test_bearer_token_only_when_present() {
        let session = SessionStore::in_memory();
        let interceptor = BearerToken::new(session.clone());

        let mut request = RequestEnvelope::new(Method::GET, "http://x/a");
        interceptor.on_request(&mut request);
        assert!(request.headers.get(AUTHORIZATION).is_none());

        session.start("t1".to_string(), None, 0).unwrap();
        interceptor.on_request(&mut request);
        assert_eq!(request.headers.get(AUTHORIZATION).unwrap(), "Bearer t1");
    }

    #[test]
    fn test_bearer_token_skips_and_clears_expired_session() {
        let clock = Arc::new(ManualClock::at_millis(1_000));
        let session = SessionStore::with_clock(Arc::new(MemoryStorage::new()), clock.clone());
        session.start("stale".to_string(), Some(json!({"id": 1})), 1_000).unwrap();
        let interceptor = BearerToken::new(session.clone());

        clock.advance(chrono::Duration::hours(25));
        let mut request = RequestEnvelope::new(Method::GET, "http://x/a");
        interceptor.on_request(&mut request);

        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert!(session.get().unwrap().is_empty());
    }

    #[test]
    fn test_cache_buster_is_unique_within_a_millisecond() {
        let clock = Arc::new(ManualClock::at_millis(1_000));
        let buster = CacheBuster::new(clock.clone());

        let mut first = RequestEnvelope::new(Method::GET, "http://x/a");
        let mut second = RequestEnvelope::new(Method::GET, "http://x/a");
        buster.on_request(&mut first);
        buster.on_request(&mut second);

        assert_eq!(first.query_value(CACHE_BUSTER_PARAM), Some("1000"));
        assert_eq!(second.query_value(CACHE_BUSTER_PARAM), Some("1001"));

        clock.set_millis(5_000);
        let mut third = RequestEnvelope::new(Method::GET, "http://x/a");
        buster.on_request(&mut third);
        assert_eq!(third.query_value(CACHE_BUSTER_PARAM), Some("5000"));
    }

    #[test]
    fn test_cache_buster_skips_writes() {
        let buster = CacheBuster::new(Arc::new(ManualClock::at_millis(1)));
        let mut request = RequestEnvelope::new(Method::POST, "http://x/a");
        buster.on_request(&mut request);
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_teardown_clears_session_and_notifies() {
        let session = SessionStore::in_memory();
        session.start("t1".to_string(), Some(json!({"id": 1})), 0).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let teardown = SessionTeardown::new(
            session.clone(),
            Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        let outcome = teardown.on_response(Err(ApiError::NotFound));
        assert_eq!(outcome, Err(ApiError::NotFound));
        assert!(session.token().is_some());

        let outcome = teardown.on_response(Err(ApiError::Unauthorized));
        assert_eq!(outcome, Err(ApiError::Unauthorized));
        assert!(session.get().unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
