use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Role assigned when the server does not send one.
const DEFAULT_ROLE: &str = "user";

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// The server may send `"role": null`; treat it like a missing role.
fn role_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_role))
}

/// Account status as reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

/// Cached snapshot of the authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default = "default_role", deserialize_with = "role_or_default")]
    pub role: String,
    #[serde(rename = "profile_pic", default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn is_deactivated(&self) -> bool {
        self.status == UserStatus::Inactive
    }

    /// Display name, falling back to the email when no name is set.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if parts.is_empty() {
            self.email.clone()
        } else {
            parts.join(" ")
        }
    }

    /// Lowercase and trim the email in place.
    pub(crate) fn normalized(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self
    }
}

/// Emails are unique and compared case-insensitively by the server.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Request payloads
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: normalize_email(email),
            password: password.trim().to_string(),
        }
    }
}

/// Fields accepted by `POST /auth/register`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl RegisterRequest {
    pub(crate) fn normalized(mut self) -> Self {
        self.email = normalize_email(&self.email);
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self
    }
}

/// Partial update for `PUT /auth/profile`. Unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.birthdate.is_none()
            && self.gender.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

// ============================================================================
// Response payloads
// ============================================================================

/// Body of a successful `POST /auth/login`.
///
/// Older server builds return the user fields flat next to the token instead
/// of nesting them under `user`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default, alias = "_id")]
    id: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    profile_pic: Option<String>,
}

impl LoginResponse {
    /// The nested user when present, otherwise a minimal one built from the
    /// top-level fields and the email the caller logged in with.
    pub fn into_user(self, email: &str) -> UserProfile {
        if let Some(user) = self.user {
            return user.normalized();
        }
        UserProfile {
            id: self.id.unwrap_or_default(),
            email: normalize_email(email),
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role.unwrap_or_else(default_role),
            profile_picture_url: self.profile_pic,
            birthdate: None,
            gender: None,
            status: UserStatus::Active,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Body of a successful `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

// ============================================================================
// Tests
// ============================================================================
