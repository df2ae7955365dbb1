use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};

use super::storage::{KeyValueStorage, MemoryStorage};

/// Session lifetime after login: 24 hours
pub const SESSION_TTL_MILLIS: i64 = 24 * 60 * 60 * 1000;

const TOKEN_KEY: &str = "token";
const EXPIRATION_KEY: &str = "tokenExpiration";
const USER_INFO_KEY: &str = "userInfo";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: Option<String>,
    /// Epoch millis
    pub token_expiration: Option<i64>,
    pub user_info: Option<Value>,
}

impl Session {
    pub fn has_token(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.token_expiration.is_none() && self.user_info.is_none()
    }

    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        matches!(self.token_expiration, Some(expiration) if now_millis >= expiration)
    }

    /// Milliseconds left, if an expiration is recorded (negative once past)
    pub fn millis_until_expiry(&self, now_millis: i64) -> Option<i64> {
        self.token_expiration.map(|expiration| expiration - now_millis)
    }
}

/// The persisted session, shared by the HTTP client, the auth operations and
/// the application shell. Clone is cheap; clones share the same storage.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn get(&self) -> Result<Session> {
        let token = self.storage.get_item(TOKEN_KEY)?;

        let token_expiration = match self.storage.get_item(EXPIRATION_KEY)? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(millis) => Some(millis),
                Err(_) => {
                    warn!(value = %raw, "Ignoring unparsable token expiration");
                    None
                }
            },
            None => None,
        };

        let user_info = match self.storage.get_item(USER_INFO_KEY)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(error = %e, "Ignoring unparsable user info");
                    None
                }
            },
            None => None,
        };

        Ok(Session {
            token,
            token_expiration,
            user_info,
        })
    }

    pub fn set(&self, session: &Session) -> Result<()> {
        if session.token.is_some() && session.token_expiration.is_none() {
            bail!("A session with a token must record its expiration");
        }

        // A stored token must never be left without its expiration: write the
        // expiration before the token, and drop the token before the expiration.
        if let Some(expiration) = session.token_expiration {
            self.storage.set_item(EXPIRATION_KEY, &expiration.to_string())?;
        }
        match session.token {
            Some(ref token) => self.storage.set_item(TOKEN_KEY, token)?,
            None => self.storage.remove_item(TOKEN_KEY)?,
        }
        if session.token_expiration.is_none() {
            self.storage.remove_item(EXPIRATION_KEY)?;
        }
        match session.user_info {
            Some(ref info) => self.storage.set_item(USER_INFO_KEY, &info.to_string())?,
            None => self.storage.remove_item(USER_INFO_KEY)?,
        }
        debug!(has_token = session.has_token(), "Session saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        for key in [TOKEN_KEY, EXPIRATION_KEY, USER_INFO_KEY] {
            self.storage
                .remove_item(key)
                .with_context(|| format!("Failed to clear session key {}", key))?;
        }
        debug!("Session cleared");
        Ok(())
    }

    /// Persist a fresh session issued at `issued_at` (epoch millis)
    pub fn start(&self, token: String, user_info: Option<Value>, issued_at: i64) -> Result<Session> {
        let session = Session {
            token: Some(token),
            token_expiration: Some(issued_at + SESSION_TTL_MILLIS),
            user_info,
        };
        self.set(&session)?;
        info!(expires_at = issued_at + SESSION_TTL_MILLIS, "Session started");
        Ok(session)
    }

    pub fn set_user_info(&self, user_info: &Value) -> Result<()> {
        self.storage.set_item(USER_INFO_KEY, &user_info.to_string())
    }

    /// The bearer token, if a non-empty one is stored
    pub fn token(&self) -> Option<String> {
        match self.storage.get_item(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                None
            }
        }
    }

    /// Clear the store if the recorded expiration has passed.
    /// Returns true when the session was stale.
    pub fn expire_if_stale(&self) -> bool {
        let session = match self.get() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Failed to read session");
                return false;
            }
        };
        if !session.is_expired_at(self.now_millis()) {
            return false;
        }
        info!("Session expired, clearing");
        if let Err(e) = self.clear() {
            warn!(error = %e, "Failed to clear expired session");
        }
        true
    }

    /// True iff a token exists and has not expired. Clears an expired session.
    pub fn is_valid(&self) -> bool {
        self.valid_token().is_some()
    }

    /// The bearer token to send, or None when there is none or it has
    /// expired. An expired session is cleared.
    pub fn valid_token(&self) -> Option<String> {
        if self.expire_if_stale() {
            return None;
        }
        self.token()
    }
}
