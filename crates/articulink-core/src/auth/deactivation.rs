//! Parsing of account-deactivation messages for display.
//!
//! The server reports deactivation through the `detail` string, e.g.
//! `"Account temporarily deactivated. Available in 3 days."` or
//! `"Account deactivated: Terms of service violation"`.

use std::fmt;

/// Substring that marks a deactivation response. Matched case-sensitively.
pub const DEACTIVATION_MARKER: &str = "deactivated";

const REASON_PREFIX: &str = "Reason: ";
const PERMANENT_PREFIX: &str = "Account deactivated: ";
const AVAILABLE_PREFIX: &str = "Available in ";
const NO_REASON: &str = "No reason provided";

pub fn is_deactivation_detail(detail: &str) -> bool {
    detail.contains(DEACTIVATION_MARKER)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationKind {
    Temporary,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeactivationNotice {
    pub detail: String,
    pub kind: DeactivationKind,
    pub days_remaining: Option<u32>,
    pub reason: Option<String>,
}

impl DeactivationNotice {
    pub fn parse(detail: &str) -> Self {
        let kind = if detail.contains("temporarily deactivated") {
            DeactivationKind::Temporary
        } else {
            DeactivationKind::Permanent
        };

        Self {
            detail: detail.to_string(),
            kind,
            days_remaining: parse_days(detail),
            reason: parse_reason(detail),
        }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            DeactivationKind::Temporary => "Account Temporarily Deactivated",
            DeactivationKind::Permanent => "Account Permanently Deactivated",
        }
    }

    /// User-facing explanation, including the countdown and reason when known.
    pub fn message(&self) -> String {
        let mut message = match (self.kind, self.days_remaining) {
            (DeactivationKind::Temporary, Some(days)) => format!(
                "Your account is temporarily deactivated. It will be automatically reactivated in {} day{}.",
                days,
                if days > 1 { "s" } else { "" }
            ),
            (DeactivationKind::Temporary, None) => {
                "Your account is temporarily deactivated. Please try again later.".to_string()
            }
            (DeactivationKind::Permanent, _) => {
                "Your account has been permanently deactivated.".to_string()
            }
        };

        if let Some(ref reason) = self.reason {
            message.push_str("\n\nReason: ");
            message.push_str(reason);
        }
        if self.kind == DeactivationKind::Permanent {
            message.push_str("\n\nPlease contact support for more information.");
        }
        message
    }
}

impl fmt::Display for DeactivationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// "Available in N days" -> N
fn parse_days(detail: &str) -> Option<u32> {
    let start = detail.find(AVAILABLE_PREFIX)? + AVAILABLE_PREFIX.len();
    let rest = &detail[start..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || !rest[digits.len()..].starts_with(" day") {
        return None;
    }
    digits.parse().ok()
}

fn parse_reason(detail: &str) -> Option<String> {
    let start = detail
        .find(REASON_PREFIX)
        .map(|i| i + REASON_PREFIX.len())
        .or_else(|| detail.find(PERMANENT_PREFIX).map(|i| i + PERMANENT_PREFIX.len()))?;

    let reason = detail[start..].trim();
    if reason.is_empty() || reason == NO_REASON {
        None
    } else {
        Some(reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_is_case_sensitive() {
        assert!(is_deactivation_detail("Account deactivated: spam"));
        assert!(!is_deactivation_detail("Account DEACTIVATED"));
        assert!(!is_deactivation_detail("Invalid credentials"));
    }

    #[test]
    fn test_temporary_with_countdown() {
        let notice = DeactivationNotice::parse(
            "Account temporarily deactivated. Available in 3 days.",
        );
        assert_eq!(notice.kind, DeactivationKind::Temporary);
        assert_eq!(notice.days_remaining, Some(3));
        assert_eq!(notice.reason, None);
        assert_eq!(notice.title(), "Account Temporarily Deactivated");
        assert_eq!(
            notice.message(),
            "Your account is temporarily deactivated. It will be automatically reactivated in 3 days."
        );
    }

    #[test]
    fn test_temporary_single_day_and_soon() {
        let one = DeactivationNotice::parse("Account temporarily deactivated. Available in 1 days.");
        assert!(one.message().ends_with("in 1 day."));

        let zero = DeactivationNotice::parse("Account temporarily deactivated. Available in 0 days.");
        assert_eq!(zero.days_remaining, Some(0));
        assert!(zero.message().ends_with("in 0 day."));

        let soon = DeactivationNotice::parse("Account temporarily deactivated. Available soon.");
        assert_eq!(soon.days_remaining, None);
        assert_eq!(
            soon.message(),
            "Your account is temporarily deactivated. Please try again later."
        );
    }

    #[test]
    fn test_permanent_with_reason() {
        let notice = DeactivationNotice::parse("Account deactivated: Repeated abuse");
        assert_eq!(notice.kind, DeactivationKind::Permanent);
        assert_eq!(notice.reason.as_deref(), Some("Repeated abuse"));
        assert_eq!(
            notice.message(),
            "Your account has been permanently deactivated.\n\nReason: Repeated abuse\n\nPlease contact support for more information."
        );
    }

    #[test]
    fn test_reason_prefix_and_placeholder() {
        let notice = DeactivationNotice::parse(
            "Account temporarily deactivated. Available in 2 days. Reason: Cooling off",
        );
        assert_eq!(notice.days_remaining, Some(2));
        assert_eq!(notice.reason.as_deref(), Some("Cooling off"));

        let none = DeactivationNotice::parse("Account deactivated: No reason provided");
        assert_eq!(none.reason, None);
    }
}
