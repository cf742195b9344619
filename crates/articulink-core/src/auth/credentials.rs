use std::sync::Arc;

use tracing::warn;

use super::store::{KeyValueStore, StoreError};
use crate::models::UserProfile;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// Typed access to the persisted credential record.
///
/// Reads never fail: an unreadable or unparseable value is logged and
/// reported as absent.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read credential");
                None
            }
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY).await
    }

    pub async fn user(&self) -> Option<UserProfile> {
        let raw = self.read(USER_KEY).await?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Discarding unparseable cached user");
                None
            }
        }
    }

    /// Check if an access token is stored
    pub async fn has_access_token(&self) -> bool {
        self.access_token().await.is_some()
    }

    pub async fn store_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(ACCESS_TOKEN_KEY, token).await
    }

    pub async fn store_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(REFRESH_TOKEN_KEY, token).await
    }

    pub async fn store_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        let json = serde_json::to_string(user)?;
        self.store.set(USER_KEY, &json).await
    }

    /// Persist a complete session. The token is written before the user so a
    /// reader never sees a user without a token.
    pub async fn store_session(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: &UserProfile,
    ) -> Result<(), StoreError> {
        self.store_access_token(access_token).await?;
        match refresh_token {
            Some(token) => self.store_refresh_token(token).await?,
            None => self.store.remove(REFRESH_TOKEN_KEY).await?,
        }
        self.store_user(user).await
    }

    /// Remove every credential key. Best-effort: failures are logged, never
    /// returned.
    pub async fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key).await {
                warn!(key, error = %e, "Failed to remove credential");
            }
        }
    }
}
