//! The token provider: hands out credentials that are safe to attach.
//!
//! Every outbound API call asks this component for a bearer credential.
//! The contract: the returned token is valid for at least the refresh
//! safety margin into the future, so a request never leaves the process
//! with a token that is about to die mid-flight.
//!
//! # Single-flight refresh
//!
//! Refreshing is memoized as an explicit state machine:
//!
//! ```text
//!   IDLE ──(first caller)──→ IN_FLIGHT ──(settles)──→ IDLE
//!              │                  ↑
//!              └──(later callers attach to the same future)
//! ```
//!
//! The in-flight operation is a [`Shared`] future stored behind a
//! mutex. Callers that arrive while a refresh is running clone the
//! shared handle and await the same provider round trip — N concurrent
//! callers produce exactly one refresh request, and all of them observe
//! the same outcome. The mutex is only ever held to swap the slot,
//! never across an await point.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::{debug, warn};

use crate::{AuthError, CredentialStore, IdentityProvider, Session, unix_now};

/// Safety margin before expiry at which a token is considered stale.
///
/// A token inside this margin is proactively refreshed before being
/// handed out, so it cannot expire during a request round trip.
pub const REFRESH_MARGIN_SECS: u64 = 5 * 60;

/// A refresh that every attached caller can await and clone the result of.
type SharedRefresh = Shared<BoxFuture<'static, Result<Session, AuthError>>>;

/// Obtains and refreshes access credentials from the identity provider.
///
/// One instance per process, shared behind an `Arc` by the HTTP client
/// core. Holds the last known [`Session`] and refreshes it proactively
/// when its remaining lifetime drops below [`REFRESH_MARGIN_SECS`].
pub struct TokenProvider<P> {
    provider: Arc<P>,

    /// Optional durable fallback for the legacy direct-login path.
    /// Consulted only when the provider has no session at all.
    legacy: Option<Arc<dyn CredentialStore>>,

    /// Last session seen from the provider. Replaced wholesale on
    /// refresh; never mutated in place.
    session: Mutex<Option<Session>>,

    /// The in-flight refresh, if any. `None` = IDLE, `Some` = IN_FLIGHT.
    refresh_slot: Mutex<Option<SharedRefresh>>,
}

impl<P: IdentityProvider> TokenProvider<P> {
    /// Creates a token provider backed by the given identity provider.
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            legacy: None,
            session: Mutex::new(None),
            refresh_slot: Mutex::new(None),
        }
    }

    /// Attaches the legacy credential store fallback.
    pub fn with_legacy_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.legacy = Some(store);
        self
    }

    /// Returns a credential valid for at least the safety margin.
    ///
    /// If the cached token is inside the margin, a refresh runs first
    /// and the fresh token is returned. If the refresh fails, the
    /// previous (possibly expiring) token is returned instead — the
    /// request is still attempted and the server-side 401 path decides
    /// whether the session is really over. Returns `None` only when no
    /// credential exists anywhere (no provider session, no legacy pair).
    pub async fn valid_token(&self) -> Option<String> {
        let session = match self.cached_session() {
            Some(session) => Some(session),
            None => self.fetch_session().await,
        };

        let Some(session) = session else {
            // Primary session entirely absent → legacy fallback.
            return self.legacy_token();
        };

        if !session.expires_within(Duration::from_secs(REFRESH_MARGIN_SECS), unix_now()) {
            return Some(session.access_token);
        }

        match self.refresh().await {
            Ok(fresh) => Some(fresh.access_token),
            Err(e) => {
                // Refresh racing with natural expiry is not a hard
                // failure: hand back the old token and let the 401
                // path make the final call.
                warn!(error = %e, "token refresh failed, using previous credential");
                Some(session.access_token)
            }
        }
    }

    /// Returns whatever credential is available right now, without
    /// refreshing or touching the network.
    ///
    /// Used for unprotected endpoints, which attach a token only if one
    /// happens to exist.
    pub fn current_token(&self) -> Option<String> {
        if let Some(session) = self.cached_session() {
            return Some(session.access_token);
        }
        self.legacy_token()
    }

    /// Forces a refresh against the identity provider.
    ///
    /// Single-flight: concurrent callers attach to the same in-flight
    /// operation and observe the same outcome. On success the cached
    /// session is replaced with the fresh one.
    ///
    /// # Errors
    /// Propagates the provider's failure to every attached caller.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let (shared, is_leader) = {
            let mut slot = self.refresh_slot.lock().expect("refresh slot lock poisoned");
            match slot.as_ref() {
                // IN_FLIGHT: attach to the existing operation.
                Some(shared) => (shared.clone(), false),
                // IDLE: this caller starts the refresh.
                None => {
                    let provider = Arc::clone(&self.provider);
                    let shared: SharedRefresh = async move {
                        provider.refresh_session().await
                    }
                    .boxed()
                    .shared();
                    *slot = Some(shared.clone());
                    (shared, true)
                }
            }
        };

        if is_leader {
            debug!("starting credential refresh");
        } else {
            debug!("attaching to in-flight credential refresh");
        }

        let result = shared.clone().await;

        // Settle: back to IDLE so the next refresh starts fresh. Every
        // attached caller runs this, so only remove the slot if it
        // still holds OUR operation — a late waiter must not evict a
        // newer refresh that another caller has already started.
        {
            let mut slot = self.refresh_slot.lock().expect("refresh slot lock poisoned");
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&shared)) {
                slot.take();
            }
        }

        if let Ok(session) = &result {
            *self.session.lock().expect("session lock poisoned") = Some(session.clone());
        }

        result
    }

    /// Drops the cached session. The next `valid_token` call re-fetches
    /// from the provider. Called on sign-out.
    pub fn invalidate(&self) {
        self.session
            .lock()
            .expect("session lock poisoned")
            .take();
    }

    fn cached_session(&self) -> Option<Session> {
        self.session.lock().expect("session lock poisoned").clone()
    }

    /// Asks the provider for the current session and caches the answer.
    /// A provider error is logged and treated as "no session" so the
    /// legacy fallback still gets its chance.
    async fn fetch_session(&self) -> Option<Session> {
        match self.provider.get_session().await {
            Ok(session) => {
                if let Some(session) = &session {
                    *self.session.lock().expect("session lock poisoned") =
                        Some(session.clone());
                }
                session
            }
            Err(e) => {
                warn!(error = %e, "could not fetch session from identity provider");
                None
            }
        }
    }

    fn legacy_token(&self) -> Option<String> {
        let store = self.legacy.as_ref()?;
        match store.load() {
            Ok(Some(credentials)) => {
                debug!("using legacy credential fallback");
                Some(credentials.access_token)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "legacy credential store unreadable");
                None
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
