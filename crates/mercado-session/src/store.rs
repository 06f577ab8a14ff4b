//! The session store: one authoritative record of "who is logged in".
//!
//! Exactly one store exists per process (the facade constructs it once
//! and every consumer shares the same handle). It owns the [`Snapshot`]
//! state, an observer registry, and the deduplicated initialization
//! machinery.
//!
//! # Deduplicated initialization
//!
//! The first access starts the one-and-only initial identity fetch,
//! memoized as an explicit state machine:
//!
//! ```text
//!   IDLE ──(first caller)──→ IN_FLIGHT ──(settles)──→ SETTLED (forever)
//!                                 ↑
//!            later callers attach to the same shared future
//! ```
//!
//! Unlike the token provider's refresh (which returns to IDLE so the
//! next refresh can run), initialization settles once per process
//! lifetime: after that, `ensure_initialized` is a no-op.
//!
//! # Concurrency note
//!
//! State and the subscriber registry sit behind plain `std` mutexes,
//! held only for field access — never across an await point, and never
//! while listeners run. Listener notification iterates a stable
//! snapshot of the registry, so a listener may unsubscribe (itself or
//! another subscriber) mid-notification without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mercado_auth::{AuthError, AuthEvent, IdentityProvider, Session};

use crate::{Snapshot, StorePhase};

/// A subscriber callback. Receives the committed snapshot by reference.
type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// The registry is shared separately from the store so a
/// [`Subscription`] can deregister itself without being generic over
/// the identity provider.
type Registry = Arc<Mutex<HashMap<u64, Listener>>>;

/// The memoized initial fetch.
type SharedInit = Shared<BoxFuture<'static, ()>>;

struct StoreState {
    session: Option<Session>,
    session_loaded: bool,
    phase: StorePhase,
}

struct Inner<P> {
    provider: Arc<P>,
    state: Mutex<StoreState>,
    subscribers: Registry,
    next_subscriber_id: AtomicU64,
    /// `None` = IDLE; `Some` = IN_FLIGHT or SETTLED (the latch below
    /// short-circuits before the slot is ever read again).
    init_slot: Mutex<Option<SharedInit>>,
    initialized: AtomicBool,
}

/// The process-wide session store.
///
/// A cheap-clone handle: clones share the same state, so the facade
/// hands copies to every consumer and they all observe one record.
pub struct SessionStore<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for SessionStore<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: IdentityProvider> SessionStore<P> {
    /// Creates a store backed by the given identity provider.
    ///
    /// The store starts `Uninitialized`; nothing is fetched until the
    /// first subscription or an explicit [`ensure_initialized`] call.
    ///
    /// [`ensure_initialized`]: Self::ensure_initialized
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                state: Mutex::new(StoreState {
                    session: None,
                    session_loaded: false,
                    phase: StorePhase::Uninitialized,
                }),
                subscribers: Arc::new(Mutex::new(HashMap::new())),
                next_subscriber_id: AtomicU64::new(1),
                init_slot: Mutex::new(None),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the current state synchronously.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock().expect("state lock poisoned");
        Snapshot {
            session: state.session.clone(),
            session_loaded: state.session_loaded,
            phase: state.phase,
        }
    }

    /// Registers a listener invoked on every state transition.
    ///
    /// The listener is NOT invoked with the current state — read
    /// [`snapshot`](Self::snapshot) for that. Dropping the returned
    /// [`Subscription`] (or calling its `unsubscribe`) deregisters it.
    ///
    /// The first subscription lazily kicks off initialization in a
    /// background task; must be called from within a Tokio runtime.
    pub fn subscribe(
        &self,
        listener: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .insert(id, Arc::new(listener));
        debug!(subscriber = id, "listener subscribed");

        if !self.inner.initialized.load(Ordering::Acquire) {
            let store = self.clone();
            tokio::spawn(async move { store.ensure_initialized().await });
        }

        Subscription {
            subscribers: Arc::downgrade(&self.inner.subscribers),
            id,
        }
    }

    /// Runs the initial identity fetch, exactly once per process.
    ///
    /// Concurrent callers attach to the same in-flight operation; once
    /// it settles this is a no-op forever. `session_loaded` flips to
    /// `true` when the fetch settles — success, empty, or error alike —
    /// so a consumer can never observe a store stuck in loading.
    pub async fn ensure_initialized(&self) {
        if self.inner.initialized.load(Ordering::Acquire) {
            return;
        }

        let shared = {
            let mut slot = self.inner.init_slot.lock().expect("init slot lock poisoned");
            match slot.as_ref() {
                Some(shared) => shared.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let shared: SharedInit = async move {
                        Inner::set_loading(&inner);
                        let session = match inner.provider.get_session().await {
                            Ok(session) => session,
                            Err(e) => {
                                // The store must still resolve: an
                                // unreachable provider reads as
                                // anonymous, not as stuck-loading.
                                warn!(error = %e, "initial session fetch failed");
                                None
                            }
                        };
                        inner.initialized.store(true, Ordering::Release);
                        Inner::commit(&inner, session);
                        info!("session store initialized");
                    }
                    .boxed()
                    .shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        shared.await;
    }

    /// Re-fetches the session and republishes it.
    ///
    /// For use after known mutations — login, logout, credential
    /// rotation. On success the state is replaced (even if identical)
    /// and every listener is notified before this returns. On provider
    /// failure the previous state is kept: a flaky provider must not
    /// sign the user out.
    ///
    /// # Errors
    /// Propagates the provider error after logging it.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        match self.inner.provider.get_session().await {
            Ok(session) => {
                Inner::commit(&self.inner, session);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed, keeping previous state");
                Err(e)
            }
        }
    }

    /// Best-effort refresh for external signals (refocus, visibility).
    /// Failures are swallowed and logged; consumers never see them.
    pub async fn passive_refresh(&self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "passive session refresh failed");
        }
    }

    /// Drops the local identity immediately and notifies listeners.
    ///
    /// Called on terminal auth failure (the 401 path) and on sign-out.
    /// Synchronous: no network round trip, just a state transition.
    pub fn clear_session(&self) {
        info!("clearing local session");
        Inner::commit(&self.inner, None);
    }

    /// Spawns a task that passively refreshes on every signal — the
    /// window-refocus / visibility-change analog.
    ///
    /// Dropping the returned [`SignalWatcher`] aborts the task
    /// (best-effort teardown).
    pub fn watch_signal(&self, mut signal: broadcast::Receiver<()>) -> SignalWatcher {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match signal.recv().await {
                    Ok(()) => store.passive_refresh().await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missing a few refocus signals is harmless —
                        // the next one refreshes to the same endpoint
                        // state anyway.
                        debug!(skipped, "refresh signal receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SignalWatcher { handle }
    }

    /// Spawns a task that passively refreshes on every auth-state event
    /// from the identity provider (sign-in, sign-out, token rotation).
    ///
    /// Dropping the returned [`SignalWatcher`] aborts the task.
    pub fn watch_auth_events(
        &self,
        mut events: broadcast::Receiver<AuthEvent>,
    ) -> SignalWatcher {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(?event, "auth state changed, refreshing session");
                        store.passive_refresh().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "auth event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SignalWatcher { handle }
    }
}

impl<P> Inner<P> {
    /// Commits `Uninitialized → Loading`. Only the init leader calls
    /// this. A no-op if an explicit `refresh` already resolved the
    /// store first — consumers never see `Loading` after resolution.
    fn set_loading(inner: &Arc<Self>) {
        let snapshot = {
            let mut state = inner.state.lock().expect("state lock poisoned");
            if state.session_loaded {
                return;
            }
            state.phase = StorePhase::Loading;
            Snapshot {
                session: state.session.clone(),
                session_loaded: state.session_loaded,
                phase: state.phase,
            }
        };
        Self::notify(inner, &snapshot);
    }

    /// Replaces the state with a terminal phase and notifies listeners.
    ///
    /// `session_loaded` latches: it is set on the first commit and
    /// never unset afterwards.
    fn commit(inner: &Arc<Self>, session: Option<Session>) {
        let snapshot = {
            let mut state = inner.state.lock().expect("state lock poisoned");
            state.phase = if session.is_some() {
                StorePhase::Authenticated
            } else {
                StorePhase::Anonymous
            };
            state.session = session;
            state.session_loaded = true;
            Snapshot {
                session: state.session.clone(),
                session_loaded: state.session_loaded,
                phase: state.phase,
            }
        };
        Self::notify(inner, &snapshot);
    }

    /// Invokes every listener with the committed snapshot.
    ///
    /// Iterates a stable copy of the registry taken under the lock,
    /// then calls listeners with the lock released — a listener that
    /// unsubscribes (or subscribes) during notification just mutates
    /// the registry for the next round.
    fn notify(inner: &Arc<Self>, snapshot: &Snapshot) {
        let listeners: Vec<Listener> = inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A registered listener. Deregisters on drop.
///
/// Holds only a weak reference to the registry, so an outliving
/// subscription never keeps a torn-down store alive.
pub struct Subscription {
    subscribers: Weak<Mutex<HashMap<u64, Listener>>>,
    id: u64,
}

impl Subscription {
    /// Explicitly deregisters the listener (same as dropping).
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers
                .lock()
                .expect("subscriber lock poisoned")
                .remove(&self.id);
            debug!(subscriber = self.id, "listener unsubscribed");
        }
    }
}

// ---------------------------------------------------------------------------
// SignalWatcher
// ---------------------------------------------------------------------------

/// Handle to a background refresh-signal listener. Aborts the task on
/// drop — teardown is best-effort, not correctness-critical.
pub struct SignalWatcher {
    handle: JoinHandle<()>,
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =========================================================================
// Tests
// =========================================================================
