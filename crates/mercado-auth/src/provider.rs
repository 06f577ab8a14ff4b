//! The identity-provider seam.
//!
//! Mercado does not implement authentication — that's the identity
//! provider's job (a hosted auth service, an OAuth backend, or a custom
//! one). This module defines the [`IdentityProvider`] trait: the two
//! async operations the client stack needs, plus the [`AuthEvent`]
//! stream the provider emits when auth state changes out-of-band.
//!
//! Implement the trait once in the embedding application; tests use
//! in-memory mocks with call counters.

use crate::{AuthError, Session};

/// The external service that issues and refreshes credentials.
///
/// # Trait bounds
///
/// - `Send + Sync` → shared across async tasks; every layer above holds
///   the provider behind an `Arc`.
/// - `'static` → the provider lives as long as the client stack; in
///   particular the token provider captures it in a shared in-flight
///   refresh future.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Returns the current session, or `None` when nobody is signed in.
    ///
    /// # Errors
    /// Returns [`AuthError::Provider`] if the provider cannot be
    /// reached or answers with a failure.
    fn get_session(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<Session>, AuthError>> + Send;

    /// Exchanges the current (near-expired) credential for a fresh one.
    ///
    /// # Errors
    /// - [`AuthError::NoSession`] — there is nothing to refresh
    /// - [`AuthError::Provider`] — the refresh was rejected or failed
    fn refresh_session(
        &self,
    ) -> impl std::future::Future<Output = Result<Session, AuthError>> + Send;
}

/// An out-of-band auth-state change reported by the identity provider.
///
/// Providers typically emit these from another tab, a background token
/// rotation, or an admin-forced sign-out. The session store treats every
/// variant the same way: re-fetch the session and republish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in.
    SignedIn,
    /// The user signed out.
    SignedOut,
    /// The access token was rotated; identity is unchanged.
    TokenRefreshed,
}
