//! ArticuLink core - session lifecycle and API access for the ArticuLink
//! speech assistant.
//!
//! The entry point is [`auth::SessionManager`]: it restores the stored
//! session, signs users in and out, and sends every API request with the
//! current bearer token, refreshing it or ending the session as the server
//! responses require.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
pub use auth::{SessionError, SessionManager, SessionOptions, SessionState};
pub use config::{Config, StorageBackend};
pub use models::{ProfileUpdate, RegisterRequest, UserProfile, UserStatus};
