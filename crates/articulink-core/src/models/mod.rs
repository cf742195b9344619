//! Data models for ArticuLink accounts.
//!
//! - `UserProfile`, `UserStatus`: the cached authenticated identity
//! - Request payloads for login, registration and profile updates
//! - Response payloads for login and token refresh

pub mod user;

pub use user::{
    normalize_email, LoginRequest, LoginResponse, ProfileUpdate, RefreshResponse,
    RegisterRequest, UserProfile, UserStatus,
};
