//! Identity types: the data structures that represent "who is logged in".
//!
//! A [`Session`] is an immutable snapshot. It is created by the identity
//! provider, cached by the token provider and the session store, and
//! handed to consumers by value — it is replaced on every refresh or
//! sign-out, never mutated in place. Consumers can therefore hold on to
//! one without worrying about it changing underneath them.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user, as issued by the identity provider.
///
/// Newtype wrapper so a user ID can't be confused with any other string
/// (access tokens, session keys, ...) in function signatures.
///
/// `#[serde(transparent)]` keeps the JSON representation a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The authenticated user's profile, as reported by the identity provider.
///
/// Only the `id` is guaranteed; everything else depends on what the
/// provider knows about the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user identifier.
    pub id: UserId,

    /// Email address, if the provider exposes one.
    #[serde(default)]
    pub email: Option<String>,

    /// Display name, if the provider exposes one.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserIdentity {
    /// Creates an identity with only the required `id` field.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            email: None,
            display_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated session: who the user is plus the short-lived
/// credential proving it.
///
/// `expires_at` is seconds since the Unix epoch, exactly as issued by
/// the identity provider. Expiry math takes `now` as a parameter so
/// tests can pin the clock instead of sleeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated user.
    pub user: UserIdentity,

    /// Short-lived bearer credential for protected API calls.
    pub access_token: String,

    /// Unix timestamp (seconds) at which `access_token` stops working.
    pub expires_at: u64,
}

impl Session {
    /// Seconds until the access token expires, saturating at zero.
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Whether the token expires within `margin` of `now`.
    ///
    /// Used by the token provider to decide when a proactive refresh
    /// is due: a token inside the margin is treated as already stale.
    pub fn expires_within(&self, margin: Duration, now: u64) -> bool {
        self.remaining_secs(now) < margin.as_secs()
    }
}

/// Current Unix time in seconds.
///
/// The epoch is in the past on any sane clock, so the conversion
/// cannot fail in practice; a clock set before 1970 collapses to 0.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: u64) -> Session {
        Session {
            user: UserIdentity::new("user-1"),
            access_token: "tok".into(),
            expires_at,
        }
    }

    #[test]
    fn test_user_id_serializes_as_plain_string() {
        // `#[serde(transparent)]` means UserId("u1") → `"u1"`.
        let json = serde_json::to_string(&UserId("u1".into())).unwrap();
        assert_eq!(json, "\"u1\"");
    }

    #[test]
    fn test_identity_optional_fields_default_to_none() {
        let identity: UserIdentity =
            serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(identity.id, UserId("u1".into()));
        assert_eq!(identity.email, None);
        assert_eq!(identity.display_name, None);
    }

    #[test]
    fn test_remaining_secs_counts_down() {
        let session = session_expiring_at(1_000);
        assert_eq!(session.remaining_secs(400), 600);
    }

    #[test]
    fn test_remaining_secs_saturates_at_zero() {
        let session = session_expiring_at(1_000);
        assert_eq!(session.remaining_secs(2_000), 0);
    }

    #[test]
    fn test_expires_within_inside_margin() {
        // 299s of life left against a 300s margin → stale.
        let session = session_expiring_at(1_000);
        assert!(session.expires_within(Duration::from_secs(300), 701));
    }

    #[test]
    fn test_expires_within_outside_margin() {
        // 301s of life left against a 300s margin → still fresh.
        let session = session_expiring_at(1_000);
        assert!(!session.expires_within(Duration::from_secs(300), 699));
    }

    #[test]
    fn test_expires_within_already_expired() {
        let session = session_expiring_at(1_000);
        assert!(session.expires_within(Duration::from_secs(300), 5_000));
    }
}
