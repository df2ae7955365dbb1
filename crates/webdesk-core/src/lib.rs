//! webdesk-core - HTTP client, session store and auth operations for the
//! webdesk backend.
//!
//! Every call goes through [`api::HttpClient`], which attaches the bearer
//! token from the [`auth::SessionStore`], tags the request with platform
//! headers, and returns either the unwrapped `data` payload or an
//! [`api::ApiError`]. [`auth::AuthApi`] builds the login and account flows on
//! top of it.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;

pub use api::{ApiError, HttpClient, NormalizedResponse};
pub use auth::{AuthApi, Session, SessionStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
