//! Authentication module for managing the user session and credentials.
//!
//! This module provides:
//! - `SessionManager`: login/logout/refresh, profile operations and the
//!   authorized request pipeline
//! - `CredentialStore`: typed access to the persisted token/user record
//! - `KeyValueStore` backends: memory, JSON file, OS keychain
//! - `policy`: how failed responses are handled (refresh, clear, propagate)
//! - `DeactivationNotice`: display parsing for deactivated accounts
//!
//! Sessions are restored optimistically from storage; the access token is
//! only validated by the first authenticated request.

pub mod credentials;
pub mod deactivation;
pub mod error;
pub mod policy;
pub mod session;
pub mod store;

pub use credentials::CredentialStore;
pub use deactivation::{DeactivationKind, DeactivationNotice};
pub use error::SessionError;
pub use session::{SessionManager, SessionOptions, SessionState};
pub use store::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StoreError};
