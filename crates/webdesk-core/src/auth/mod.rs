//! Authentication module for managing user sessions.
//!
//! This module provides:
//! - `SessionStore`: the persisted token, expiration and user info
//! - `KeyValueStorage` backends: memory, JSON file, OS keyring
//! - `AuthApi`: login, register, profile and password-reset operations
//!
//! Sessions expire 24 hours after login.

pub mod credentials;
pub mod operations;
pub mod session;
pub mod storage;

pub use credentials::KeyringStorage;
pub use operations::{
    AuthApi, CodePurpose, LoginRequest, RegisterRequest, ResetPasswordRequest, VerificationCodeRequest,
};
pub use session::{Session, SessionStore, SESSION_TTL_MILLIS};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
