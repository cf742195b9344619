//! Decision rules for failed API responses.
//!
//! `classify` is pure: it maps a failed exchange to the action the session
//! layer takes. Rules are evaluated in order and the first match wins;
//! deactivation must never lead to a refresh attempt.

use super::deactivation::is_deactivation_detail;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const LOGOUT_ALL_PATH: &str = "/auth/logout-all";
pub const ME_PATH: &str = "/auth/me";
pub const PROFILE_PATH: &str = "/auth/profile";
pub const PROFILE_PICTURE_PATH: &str = "/auth/profile/picture";

const UNAUTHORIZED: u16 = 401;

/// Which kind of endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Login,
    Register,
    Refresh,
    Other,
}

impl Endpoint {
    pub fn from_path(path: &str) -> Self {
        let path = path.split(|c| c == '?' || c == '#').next().unwrap_or_default();
        let path = path.trim_end_matches('/');
        if path.ends_with(LOGIN_PATH) {
            Endpoint::Login
        } else if path.ends_with(REGISTER_PATH) {
            Endpoint::Register
        } else if path.ends_with(REFRESH_PATH) {
            Endpoint::Refresh
        } else {
            Endpoint::Other
        }
    }

    /// Endpoints that must never trigger a refresh-and-retry.
    pub fn is_auth(self) -> bool {
        !matches!(self, Endpoint::Other)
    }
}

/// What the session layer knows about a failed exchange.
#[derive(Debug, Clone, Copy)]
pub struct Failure<'a> {
    pub status: u16,
    pub detail: &'a str,
    pub endpoint: Endpoint,
    pub retried: bool,
    pub signed_in: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Account is deactivated: clear credentials, propagate unchanged.
    ClearDeactivated,
    /// Refresh the access token once and re-issue the request.
    RefreshAndRetry,
    /// Token is stale with no refresh path: clear credentials, propagate.
    ClearStale,
    Propagate,
}

pub fn classify(failure: &Failure<'_>) -> Recovery {
    if is_deactivation_detail(failure.detail) {
        return Recovery::ClearDeactivated;
    }

    if failure.status == UNAUTHORIZED && !failure.retried && !failure.endpoint.is_auth() {
        return Recovery::RefreshAndRetry;
    }

    if failure.status == UNAUTHORIZED && failure.signed_in && failure.endpoint != Endpoint::Login {
        return Recovery::ClearStale;
    }

    Recovery::Propagate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure<'a>(status: u16, detail: &'a str, path: &str) -> Failure<'a> {
        Failure {
            status,
            detail,
            endpoint: Endpoint::from_path(path),
            retried: false,
            signed_in: true,
        }
    }

    #[test]
    fn test_endpoint_from_path() {
        assert_eq!(Endpoint::from_path("/auth/login"), Endpoint::Login);
        assert_eq!(Endpoint::from_path("/api/v1/auth/login/"), Endpoint::Login);
        assert_eq!(Endpoint::from_path("/auth/register?x=1"), Endpoint::Register);
        assert_eq!(Endpoint::from_path("/auth/refresh"), Endpoint::Refresh);
        assert_eq!(Endpoint::from_path("/auth/me"), Endpoint::Other);
        assert_eq!(Endpoint::from_path("/auth/logout"), Endpoint::Other);
        assert_eq!(Endpoint::from_path("/transcribe"), Endpoint::Other);
    }

    #[test]
    fn test_deactivation_takes_precedence_over_refresh() {
        let f = failure(401, "Account deactivated: spam", "/auth/me");
        assert_eq!(classify(&f), Recovery::ClearDeactivated);

        let f = failure(403, "Account temporarily deactivated. Available soon.", "/chat");
        assert_eq!(classify(&f), Recovery::ClearDeactivated);
    }

    #[test]
    fn test_unauthorized_on_regular_endpoint_refreshes_once() {
        let f = failure(401, "Could not validate credentials", "/auth/me");
        assert_eq!(classify(&f), Recovery::RefreshAndRetry);

        let retried = Failure { retried: true, ..f };
        assert_eq!(classify(&retried), Recovery::ClearStale);
    }

    #[test]
    fn test_auth_endpoints_never_refresh() {
        let login = failure(401, "Invalid credentials", "/auth/login");
        assert_eq!(classify(&login), Recovery::Propagate);

        let register = failure(401, "Not authenticated", "/auth/register");
        assert_eq!(classify(&register), Recovery::ClearStale);

        let refresh = failure(401, "Invalid refresh token", "/auth/refresh");
        assert_eq!(classify(&refresh), Recovery::ClearStale);
    }

    #[test]
    fn test_stale_token_requires_signed_in_user() {
        let f = Failure {
            retried: true,
            signed_in: false,
            ..failure(401, "Not authenticated", "/auth/me")
        };
        assert_eq!(classify(&f), Recovery::Propagate);
    }

    #[test]
    fn test_other_errors_propagate() {
        let f = failure(500, "Internal Server Error", "/auth/me");
        assert_eq!(classify(&f), Recovery::Propagate);

        let f = failure(404, "User not found", "/auth/me");
        assert_eq!(classify(&f), Recovery::Propagate);
    }
}
