use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request failed ({status}): {detail}")]
    Status { status: StatusCode, detail: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..end],
                body.len()
            )
        }
    }

    pub fn from_status(status: StatusCode, body: &Value) -> Self {
        ApiError::Status {
            status,
            detail: detail_from_body(status, body),
        }
    }

    /// True when the request never produced a response.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

/// Extract the human-readable `detail` from an error body.
///
/// The server answers `{ "detail": "..." }`; request validation failures carry
/// a list of `{ "msg": "..." }` entries instead. Anything else falls back to
/// the raw (truncated) body.
pub fn detail_from_body(status: StatusCode, body: &Value) -> String {
    match body.get("detail") {
        Some(Value::String(detail)) => return detail.clone(),
        Some(Value::Array(items)) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            if !messages.is_empty() {
                return messages.join("; ");
            }
        }
        _ => {}
    }

    match body {
        Value::String(text) if !text.trim().is_empty() => ApiError::truncate_body(text),
        Value::Null => format!("Request failed with status {}", status.as_u16()),
        other => ApiError::truncate_body(&other.to_string()),
    }
}
