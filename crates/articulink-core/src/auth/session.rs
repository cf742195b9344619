use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::credentials::CredentialStore;
use super::error::SessionError;
use super::policy::{
    classify, Endpoint, Failure, Recovery, LOGIN_PATH, LOGOUT_ALL_PATH, LOGOUT_PATH, ME_PATH,
    PROFILE_PATH, PROFILE_PICTURE_PATH, REFRESH_PATH, REGISTER_PATH,
};
use super::store::KeyValueStore;
use crate::api::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
use crate::config::Config;
use crate::models::user::RefreshRequest;
use crate::models::{LoginRequest, LoginResponse, ProfileUpdate, RefreshResponse, RegisterRequest, UserProfile};

const LOGIN_FAILED_DETAIL: &str = "Login failed";
const REGISTRATION_FAILED_DETAIL: &str = "Registration failed";

type PendingRefresh = Shared<BoxFuture<'static, Result<String, SessionError>>>;

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub current_user: Option<UserProfile>,
    /// True only until `SessionManager::initialize` has run.
    pub is_initializing: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            current_user: None,
            is_initializing: true,
        }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Store and use refresh tokens. When off, an expired access token ends
    /// the session.
    pub refresh_tokens: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_tokens: true,
        }
    }
}

struct SessionInner {
    transport: Arc<dyn HttpTransport>,
    credentials: CredentialStore,
    state: watch::Sender<SessionState>,
    pending_refresh: Mutex<Option<PendingRefresh>>,
    // Held across every multi-key change to the stored record.
    record: Mutex<()>,
    options: SessionOptions,
}

/// Owns the credential record and every request that depends on it.
///
/// Cloning is cheap and yields another handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn KeyValueStore>,
        options: SessionOptions,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            inner: Arc::new(SessionInner {
                transport,
                credentials: CredentialStore::new(store),
                state,
                pending_refresh: Mutex::new(None),
                record: Mutex::new(()),
                options,
            }),
        }
    }

    /// Build a session talking to the configured API with the configured store.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::with_timeout(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
        .context("Failed to build HTTP client")?;
        let store = config.open_store()?;
        Ok(Self::new(
            Arc::new(transport),
            store,
            SessionOptions {
                refresh_tokens: config.refresh_tokens,
            },
        ))
    }

    // ===== State =====

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner.state.borrow().current_user.clone()
    }

    pub fn is_initializing(&self) -> bool {
        self.inner.state.borrow().is_initializing
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// True iff an access token is stored. No network call.
    pub async fn check_authenticated(&self) -> bool {
        self.inner.credentials.has_access_token().await
    }

    fn set_user(&self, user: Option<UserProfile>) {
        self.inner.state.send_if_modified(|state| {
            if state.current_user == user {
                false
            } else {
                state.current_user = user;
                true
            }
        });
    }

    async fn clear_session(&self) {
        let _record = self.inner.record.lock().await;
        self.inner.credentials.clear().await;
        self.set_user(None);
    }

    /// True while the stored refresh token is still `refresh_token`, i.e. no
    /// logout or new login replaced the session a refresh started from.
    async fn is_current(&self, refresh_token: &str) -> bool {
        self.inner.credentials.refresh_token().await.as_deref() == Some(refresh_token)
    }

    // ===== Lifecycle =====

    /// Restore the session from storage without contacting the server.
    /// The token is validated lazily by the first authenticated request.
    pub async fn initialize(&self) -> SessionState {
        let credentials = &self.inner.credentials;
        let token = credentials.access_token().await;
        let user = credentials.user().await;

        let restored = match (token, user) {
            (Some(_), Some(user)) if user.is_deactivated() => {
                info!(user_id = %user.id, "Cached account is deactivated, clearing session");
                credentials.clear().await;
                None
            }
            (Some(_), Some(user)) => {
                info!(email = %user.email, "Session restored from storage");
                Some(user)
            }
            (None, None) => {
                debug!("No stored credentials found");
                None
            }
            _ => {
                warn!("Discarding incomplete credential record");
                credentials.clear().await;
                None
            }
        };

        self.inner.state.send_modify(|state| {
            state.current_user = restored;
            state.is_initializing = false;
        });
        self.state()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        let payload = LoginRequest::new(email, password);
        info!(email = %payload.email, "Attempting login");

        let request = ApiRequest::post(LOGIN_PATH).json(&payload)?;
        let response = self.send(request).await.map_err(|e| {
            warn!(error = %e, "Login failed");
            match e {
                SessionError::Rejected { status: 401, detail } => {
                    SessionError::InvalidCredentials { detail }
                }
                other => other.with_network_detail(LOGIN_FAILED_DETAIL),
            }
        })?;

        let body: LoginResponse = response.json()?;
        let access_token = body.access_token.clone();
        let refresh_token = body
            .refresh_token
            .clone()
            .filter(|_| self.inner.options.refresh_tokens);
        let user = body.into_user(&payload.email);

        if user.is_deactivated() {
            warn!(user_id = %user.id, "Login returned a deactivated account");
            return Err(SessionError::deactivated());
        }

        let stored = {
            let _record = self.inner.record.lock().await;
            let stored = self
                .inner
                .credentials
                .store_session(&access_token, refresh_token.as_deref(), &user)
                .await;
            if stored.is_ok() {
                self.set_user(Some(user.clone()));
            }
            stored
        };
        if let Err(e) = stored {
            error!(error = %e, "Failed to persist session");
            self.clear_session().await;
            return Err(e.into());
        }

        info!(user_id = %user.id, "Login successful");
        Ok(user)
    }

    /// Create an account. Never signs the user in.
    pub async fn register(&self, fields: RegisterRequest) -> Result<Value, SessionError> {
        let payload = fields.normalized();
        let request = ApiRequest::post(REGISTER_PATH).json(&payload)?;
        let response = self.send(request).await.map_err(|e| {
            warn!(error = %e, "Registration failed");
            e.with_network_detail(REGISTRATION_FAILED_DETAIL)
        })?;
        info!(email = %payload.email, "Registration succeeded");
        Ok(response.body)
    }

    /// Sign out locally, telling the server on a best-effort basis.
    pub async fn logout(&self, all_devices: bool) {
        if self.inner.credentials.has_access_token().await {
            let path = if all_devices { LOGOUT_ALL_PATH } else { LOGOUT_PATH };
            match self.dispatch(&ApiRequest::post(path)).await {
                Ok(response) if response.is_success() => debug!(path, "Backend logout successful"),
                Ok(response) => warn!(
                    path,
                    status = response.status.as_u16(),
                    detail = %response.detail(),
                    "Backend logout failed (continuing anyway)"
                ),
                Err(e) => warn!(path, error = %e, "Backend logout failed (continuing anyway)"),
            }
        }

        self.clear_session().await;
        info!(all_devices, "Logout completed");
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Concurrent callers share a single in-flight exchange.
    pub async fn refresh_access_token(&self) -> Result<String, SessionError> {
        let pending = {
            let mut slot = self.inner.pending_refresh.lock().await;
            match slot.as_ref() {
                Some(pending) if pending.peek().is_none() => {
                    debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                _ => {
                    let this = self.clone();
                    let pending = async move { this.perform_refresh().await }.boxed().shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let result = pending.await;

        let mut slot = self.inner.pending_refresh.lock().await;
        if slot.as_ref().is_some_and(|p| p.peek().is_some()) {
            *slot = None;
        }
        result
    }

    async fn perform_refresh(&self) -> Result<String, SessionError> {
        let refresh_token = if self.inner.options.refresh_tokens {
            self.inner.credentials.refresh_token().await
        } else {
            None
        };
        let Some(refresh_token) = refresh_token else {
            return Err(SessionError::NoRefreshToken);
        };

        let result = self.exchange_refresh_token(&refresh_token).await;
        if let Err(ref e) = result {
            let _record = self.inner.record.lock().await;
            if self.is_current(&refresh_token).await {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.inner.credentials.clear().await;
                self.set_user(None);
            } else {
                debug!(error = %e, "Token refresh failed after the session changed");
            }
        }
        result
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<String, SessionError> {
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest { refresh_token })?;
        let response = self.dispatch(&request).await?;
        if !response.is_success() {
            return Err(SessionError::from_response(
                response.status.as_u16(),
                response.detail(),
            ));
        }

        let body: RefreshResponse = response.json()?;
        let user = body.user.map(UserProfile::normalized);
        if user.as_ref().is_some_and(UserProfile::is_deactivated) {
            return Err(SessionError::deactivated());
        }

        let credentials = &self.inner.credentials;
        let _record = self.inner.record.lock().await;
        if !self.is_current(refresh_token).await {
            debug!("Session changed during token refresh, discarding result");
            return Err(SessionError::SessionExpired);
        }
        credentials.store_access_token(&body.access_token).await?;
        if let Some(ref rotated) = body.refresh_token {
            credentials.store_refresh_token(rotated).await?;
        }
        if let Some(user) = user {
            credentials.store_user(&user).await?;
            self.set_user(Some(user));
        }

        info!("Access token refreshed");
        Ok(body.access_token)
    }

    // ===== Profile =====

    pub async fn fetch_user_profile(&self) -> Result<UserProfile, SessionError> {
        let response = self.send(ApiRequest::get(ME_PATH)).await?;
        let user: UserProfile = response.json()?;
        let user = self.adopt_user(user).await?;
        debug!(user_id = %user.id, "Profile refreshed");
        Ok(user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, SessionError> {
        let request = ApiRequest::put(PROFILE_PATH).json(update)?;
        let response = self.send(request).await?;
        let user: UserProfile = response.json()?;
        let user = self.adopt_user(user).await?;
        info!(user_id = %user.id, "Profile updated");
        Ok(user)
    }

    pub async fn delete_profile_picture(&self) -> Result<UserProfile, SessionError> {
        self.send(ApiRequest::delete(PROFILE_PICTURE_PATH)).await?;

        let _record = self.inner.record.lock().await;
        let Some(mut user) = self.inner.credentials.user().await else {
            return Err(SessionError::SessionExpired);
        };
        user.profile_picture_url = None;
        self.inner.credentials.store_user(&user).await?;
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    /// Replace the cached user with a fresh copy from the server.
    async fn adopt_user(&self, user: UserProfile) -> Result<UserProfile, SessionError> {
        let user = user.normalized();
        if user.is_deactivated() {
            warn!(user_id = %user.id, "Account is deactivated, clearing session");
            self.clear_session().await;
            return Err(SessionError::deactivated());
        }
        // The session may have been cleared while the request was in flight.
        let _record = self.inner.record.lock().await;
        if !self.inner.credentials.has_access_token().await {
            return Err(SessionError::SessionExpired);
        }

        self.inner.credentials.store_user(&user).await?;
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    // ===== Request pipeline =====

    /// Send a request with the stored bearer token. No recovery.
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, SessionError> {
        let token = self.inner.credentials.access_token().await;
        self.dispatch_as(request, token).await
    }

    async fn dispatch_as(
        &self,
        request: &ApiRequest,
        token: Option<String>,
    ) -> Result<ApiResponse, SessionError> {
        let mut outgoing = request.clone();
        match token {
            Some(token) => outgoing.bearer = Some(token),
            None => debug!(path = %request.path, "No token available for request"),
        }

        self.inner.transport.send(&outgoing).await.map_err(|e| {
            warn!(path = %request.path, error = %e, "Request failed without a response");
            SessionError::from(e)
        })
    }

    /// Send an authorized request, recovering from expired tokens and
    /// reacting to deactivation. A request is retried at most once.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let mut request = request;
        loop {
            let token = self.inner.credentials.access_token().await;
            let response = self.dispatch_as(&request, token.clone()).await?;
            if response.is_success() {
                return Ok(response);
            }

            let status = response.status.as_u16();
            let detail = response.detail();
            let endpoint = Endpoint::from_path(&request.path);
            let failure = Failure {
                status,
                detail: &detail,
                endpoint,
                retried: request.retried,
                signed_in: self.is_authenticated(),
            };
            debug!(path = %request.path, status, retried = request.retried, "Request failed");

            match classify(&failure) {
                Recovery::ClearDeactivated => {
                    warn!(path = %request.path, "Account deactivated, clearing session");
                    self.clear_session().await;
                    return Err(SessionError::from_response(status, detail));
                }
                Recovery::RefreshAndRetry => {
                    request.retried = true;
                    let current = self.inner.credentials.access_token().await;
                    if current.is_some() && current != token {
                        debug!(path = %request.path, "Token was refreshed while in flight, retrying");
                        continue;
                    }

                    debug!(path = %request.path, "Access token rejected, refreshing");
                    if let Err(e) = self.refresh_access_token().await {
                        // A failed exchange clears the session itself.
                        if e == SessionError::NoRefreshToken {
                            self.clear_session().await;
                        }
                        return Err(e);
                    }
                }
                Recovery::ClearStale => {
                    warn!(path = %request.path, "Token invalid or expired, clearing session");
                    self.clear_session().await;
                    return Err(unrecovered(status, detail, endpoint));
                }
                Recovery::Propagate => return Err(unrecovered(status, detail, endpoint)),
            }
        }
    }
}

fn unrecovered(status: u16, detail: String, endpoint: Endpoint) -> SessionError {
    if status == 401 && !endpoint.is_auth() {
        SessionError::SessionExpired
    } else {
        SessionError::from_response(status, detail)
    }
}

// ============================================================================
// Tests
// ============================================================================
