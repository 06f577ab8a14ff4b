//! Error types for the auth layer.

/// Errors that can occur while talking to the identity provider or the
/// durable credential store.
///
/// `Clone` is required because a single refresh outcome is fanned out to
/// every caller that attached to the in-flight operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// The identity provider rejected or failed the operation
    /// (network failure, invalid refresh token, provider outage).
    #[error("identity provider error: {0}")]
    Provider(String),

    /// No session exists at all — the user has never signed in, or has
    /// fully signed out. Distinct from an expired-but-refreshable session.
    #[error("no active session")]
    NoSession,

    /// The durable credential store could not be read or written.
    #[error("credential store error: {0}")]
    Store(String),
}
