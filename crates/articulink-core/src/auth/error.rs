use thiserror::Error;

use super::deactivation::{is_deactivation_detail, DeactivationNotice};
use super::store::StoreError;
use crate::api::ApiError;

/// Detail used when the transport fails without any response.
pub const NETWORK_FAILURE_DETAIL: &str = "Network request failed";

/// Errors surfaced by session operations.
///
/// `Clone` because a single refresh outcome is shared by every request
/// waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("{detail}")]
    InvalidCredentials { detail: String },

    #[error("{0}")]
    AccountDeactivated(DeactivationNotice),

    #[error("Session expired")]
    SessionExpired,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("{detail}")]
    Network { detail: String },

    #[error("{detail}")]
    Rejected { status: u16, detail: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SessionError {
    /// Classify a server error response. Deactivation wins over the status.
    pub fn from_response(status: u16, detail: String) -> Self {
        if is_deactivation_detail(&detail) {
            SessionError::AccountDeactivated(DeactivationNotice::parse(&detail))
        } else {
            SessionError::Rejected { status, detail }
        }
    }

    pub(crate) fn deactivated() -> Self {
        SessionError::AccountDeactivated(DeactivationNotice::parse("Account deactivated"))
    }

    /// Text a UI should show for this error.
    pub fn detail(&self) -> String {
        match self {
            SessionError::AccountDeactivated(notice) => notice.message(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Rejected { status, .. } => Some(*status),
            SessionError::InvalidCredentials { .. } | SessionError::SessionExpired => Some(401),
            _ => None,
        }
    }

    pub fn is_deactivation(&self) -> bool {
        matches!(self, SessionError::AccountDeactivated(_))
    }

    /// Replace a transport failure's detail with an operation-specific one.
    pub(crate) fn with_network_detail(self, detail: &str) -> Self {
        match self {
            SessionError::Network { .. } => SessionError::Network {
                detail: detail.to_string(),
            },
            other => other,
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Network(_) => SessionError::Network {
                detail: NETWORK_FAILURE_DETAIL.to_string(),
            },
            ApiError::Status { status, detail } => {
                SessionError::from_response(status.as_u16(), detail)
            }
            ApiError::InvalidResponse(msg) => SessionError::InvalidResponse(msg),
            ApiError::Encode(e) => SessionError::InvalidResponse(e.to_string()),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Storage(err.to_string())
    }
}
