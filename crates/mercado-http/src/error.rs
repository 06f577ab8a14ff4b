//! Error taxonomy and normalization for the HTTP client core.
//!
//! Consumers get exactly one error shape. Whatever the backend sent —
//! a structured validation body, a bare `detail` string, or nothing at
//! all — it is flattened into a human-readable message here, so UI code
//! never branches on transport-specific structures.

use serde_json::Value;

/// Errors surfaced by the HTTP client core.
///
/// Retryable conditions (5xx inside the retry budget, the first 401)
/// are absorbed by the pipeline and never appear here; these variants
/// are what's left after budgets are spent.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A 401 that persisted after one refresh attempt. Terminal: the
    /// local identity has been cleared by the time this is returned.
    #[error("authentication expired")]
    AuthExpired,

    /// A server error (5xx) that survived the retry budget.
    #[error("server error ({status}): {message}")]
    Transient { status: u16, message: String },

    /// The server is rate-limiting the caller (429). Never retried
    /// automatically — this is a caller-visible condition, not a
    /// transport glitch.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The request was rejected as invalid (400/422), with field
    /// errors flattened into the message.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// Any other non-success status.
    #[error("request failed ({status}): {message}")]
    Api { status: u16, message: String },

    /// No response was received at all (connect failure, timeout).
    /// Not retried.
    #[error("network error: {0}")]
    Network(String),

    /// The response arrived but did not match the expected shape.
    #[error("unexpected response shape: {0}")]
    Decode(String),

    /// The request could not be constructed (bad path, bad MIME type).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// The single human-readable message consumers display.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Flattens an error response body into one message.
///
/// Handles the two shapes the backend emits:
/// `{ "detail": "..." }` and `{ "detail": [{"loc": [...], "msg": "..."}] }`.
/// Anything else falls back to a `message` field, then the raw body,
/// then the bare status code.
pub(crate) fn normalize_error_body(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        if let Some(detail) = parsed.get("detail") {
            match detail {
                Value::String(message) => return message.clone(),
                Value::Array(items) => {
                    let flattened = flatten_field_errors(items);
                    if !flattened.is_empty() {
                        return flattened;
                    }
                }
                _ => {}
            }
        }
        if let Some(Value::String(message)) = parsed.get("message") {
            return message.clone();
        }
    }
    if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        body.trim().to_string()
    }
}

/// Turns `[{"loc": ["body", "email"], "msg": "field required"}, ...]`
/// into `"email: field required; ..."`.
fn flatten_field_errors(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|item| {
            let msg = item.get("msg")?.as_str()?;
            // The last `loc` element is the field; earlier ones are
            // container names ("body", "query") nobody wants to read.
            let field = item
                .get("loc")
                .and_then(|loc| loc.as_array())
                .and_then(|loc| loc.last())
                .map(|leaf| match leaf {
                    Value::String(name) => name.clone(),
                    other => other.to_string(),
                });
            Some(match field {
                Some(field) => format!("{field}: {msg}"),
                None => msg.to_string(),
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_string_detail() {
        let message = normalize_error_body(404, r#"{"detail": "Item not found"}"#);
        assert_eq!(message, "Item not found");
    }

    #[test]
    fn test_normalize_structured_detail_flattens_fields() {
        let body = r#"{"detail": [
            {"loc": ["body", "email"], "msg": "field required"},
            {"loc": ["body", "price"], "msg": "must be positive"}
        ]}"#;

        let message = normalize_error_body(422, body);

        assert_eq!(message, "email: field required; price: must be positive");
    }

    #[test]
    fn test_normalize_numeric_loc_leaf() {
        // Array indices can appear as the loc leaf.
        let body = r#"{"detail": [{"loc": ["body", "images", 2], "msg": "too large"}]}"#;
        assert_eq!(normalize_error_body(422, body), "2: too large");
    }

    #[test]
    fn test_normalize_message_field_fallback() {
        let message = normalize_error_body(500, r#"{"message": "boom"}"#);
        assert_eq!(message, "boom");
    }

    #[test]
    fn test_normalize_raw_body_fallback() {
        let message = normalize_error_body(502, "Bad Gateway");
        assert_eq!(message, "Bad Gateway");
    }

    #[test]
    fn test_normalize_empty_body_uses_status() {
        assert_eq!(normalize_error_body(503, ""), "HTTP 503");
        assert_eq!(normalize_error_body(503, "   "), "HTTP 503");
    }

    #[test]
    fn test_normalize_malformed_detail_entries_fall_back() {
        // An array detail with no usable entries shouldn't produce "".
        let message = normalize_error_body(422, r#"{"detail": [{"code": 1}]}"#);
        assert_eq!(message, r#"{"detail": [{"code": 1}]}"#);
    }

    #[test]
    fn test_error_display_includes_status() {
        let err = ApiError::Transient {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("unavailable"));
    }
}
