//! Failure taxonomy for calls to generative services.
//!
//! Vendors expose no structured error taxonomy we can rely on, so every
//! failure is classified from an optional HTTP status plus the raw error
//! message. Only [`FailureClass::ContentSafety`] is worth spending a
//! fallback attempt on; everything else is surfaced as-is.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Substrings that identify a content-policy rejection in a vendor message.
pub const SAFETY_MARKERS: &[&str] = &["PROHIBITED_CONTENT", "SAFETY", "blockReason", "Block"];

/// Google RPC status names that identify an authentication failure.
const AUTH_MARKERS: &[&str] = &["UNAUTHENTICATED", "API_KEY_INVALID"];

/// Google RPC status name for a missing model or route.
const NOT_FOUND_MARKER: &str = "NOT_FOUND";

/// Google RPC status name for quota exhaustion.
const RATE_LIMIT_MARKER: &str = "RESOURCE_EXHAUSTED";

/// Fallback text for failures that carry no message at all.
pub const UNKNOWN_ERROR: &str = "Unknown error";

// ---------------------------------------------------------------------------
// FailureClass
// ---------------------------------------------------------------------------

/// Classified failure of a generation call or remote render task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Network, DNS, TLS, 5xx, or anything unrecognised.
    Transport,
    /// HTTP 401 or an invalid API key.
    Authentication,
    /// HTTP 404: wrong model name or base URL.
    NotFound,
    /// HTTP 429 or quota exhaustion.
    RateLimited,
    /// The request or one of its attachments violated a content policy.
    ContentSafety,
    /// A remote render task reported failure.
    RemoteJobFailed,
    /// The poll ceiling was reached before the remote task finished.
    Timeout,
    /// The remote task succeeded but no result could be located.
    ResultUnresolvable,
    /// Aborted by an external signal.
    Cancelled,
}

impl FailureClass {
    /// Whether this failure should move the invocation cascade to its next
    /// strategy instead of propagating.
    pub fn triggers_cascade(self) -> bool {
        matches!(self, FailureClass::ContentSafety)
    }
}

/// Whether `message` contains one of the [`SAFETY_MARKERS`].
pub fn has_safety_marker(message: &str) -> bool {
    SAFETY_MARKERS.iter().any(|m| message.contains(m))
}

/// Classify a failed synchronous call from its transport status and message.
///
/// Authentication, not-found and rate-limit statuses win over any marker
/// in the body. Otherwise a safety marker, or any remaining 4xx status,
/// is a content-safety rejection. Everything else is a transport failure.
pub fn classify(status: Option<u16>, message: &str) -> FailureClass {
    match status {
        Some(401) => return FailureClass::Authentication,
        Some(404) => return FailureClass::NotFound,
        Some(429) => return FailureClass::RateLimited,
        _ => {}
    }

    if status.is_none() {
        if AUTH_MARKERS.iter().any(|m| message.contains(m)) {
            return FailureClass::Authentication;
        }
        if message.contains(NOT_FOUND_MARKER) {
            return FailureClass::NotFound;
        }
        if message.contains(RATE_LIMIT_MARKER) {
            return FailureClass::RateLimited;
        }
    }

    if has_safety_marker(message) {
        return FailureClass::ContentSafety;
    }

    match status {
        Some(s) if (400..500).contains(&s) => FailureClass::ContentSafety,
        _ => FailureClass::Transport,
    }
}

// ---------------------------------------------------------------------------
// User-facing phrasing
// ---------------------------------------------------------------------------

/// Translate recognised vendor substrings into clearer phrasing.
///
/// The raw detail is always kept in parentheses so nothing is lost for
/// diagnostics. Unrecognised messages are returned unchanged.
pub fn user_facing_message(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return UNKNOWN_ERROR.to_string();
    }

    let hint = if raw.contains("Chinese") {
        Some("Prompt contains Chinese text, which this API rejects")
    } else if raw.contains("401") || AUTH_MARKERS.iter().any(|m| raw.contains(m)) {
        Some("API key is invalid or unauthorized")
    } else if raw.contains("403") || raw.contains("PERMISSION_DENIED") {
        Some("Permission denied: the API key cannot use this model")
    } else if raw.contains(RATE_LIMIT_MARKER) || raw.contains("429") {
        Some("Rate limit or quota exceeded")
    } else if has_safety_marker(raw) {
        Some("Request was blocked by the content safety filter")
    } else {
        None
    };

    match hint {
        Some(hint) => format!("{hint} ({raw})"),
        None => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
