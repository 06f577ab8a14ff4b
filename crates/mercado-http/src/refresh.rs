//! The refresh coordinator: at most one credential refresh in flight.
//!
//! When several requests hit a 401 at once, only the first may actually
//! refresh the credential. Everyone else parks in a FIFO queue and
//! resumes when the in-flight refresh settles — with the same outcome,
//! so either all of them replay with the new token or all of them fail
//! together. Partial outcomes across queued requests are disallowed.
//!
//! ```text
//!          begin()                      begin()
//!   IDLE ──────────→ REFRESHING ─┬───────────────→ (queued waiter)
//!    ↑                           │
//!    └────── complete(outcome) ──┴──→ queue drained once, FIFO
//! ```
//!
//! The mutex guards only the `{is_refreshing, queue}` pair and is never
//! held across an await point; waiters block on their own oneshot
//! channel, not on the lock.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

/// How a coordinated refresh ended. Delivered uniformly to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The refresh succeeded; replay with this token.
    Refreshed(String),
    /// The refresh failed; every queued request fails together.
    Failed(String),
}

/// What [`RefreshCoordinator::begin`] assigns to a caller.
pub enum RefreshTicket {
    /// This caller performs the refresh and must call
    /// [`RefreshCoordinator::complete`] with the outcome — even on
    /// failure, or the queue never drains.
    Leader,
    /// A refresh is already in flight; await the outcome on this
    /// channel.
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

struct CoordinatorState {
    is_refreshing: bool,
    pending: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

/// Serializes "start a new refresh" decisions for the whole process.
///
/// One instance per client; every request that needs a refreshed
/// credential goes through it.
pub struct RefreshCoordinator {
    state: Mutex<CoordinatorState>,
}

impl RefreshCoordinator {
    /// Creates an idle coordinator.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                is_refreshing: false,
                pending: VecDeque::new(),
            }),
        }
    }

    /// Claims a role in the current refresh round.
    ///
    /// The first caller while idle becomes the [`RefreshTicket::Leader`];
    /// everyone else until `complete` is a queued
    /// [`RefreshTicket::Waiter`].
    pub fn begin(&self) -> RefreshTicket {
        let mut state = self.state.lock().expect("coordinator lock poisoned");
        if state.is_refreshing {
            let (tx, rx) = oneshot::channel();
            state.pending.push_back(tx);
            debug!(queued = state.pending.len(), "queued behind in-flight refresh");
            RefreshTicket::Waiter(rx)
        } else {
            state.is_refreshing = true;
            RefreshTicket::Leader
        }
    }

    /// Settles the in-flight refresh and drains the queue exactly once,
    /// in FIFO order, delivering the same outcome to every waiter.
    pub fn complete(&self, outcome: RefreshOutcome) {
        let pending = {
            let mut state = self.state.lock().expect("coordinator lock poisoned");
            state.is_refreshing = false;
            std::mem::take(&mut state.pending)
        };
        debug!(waiters = pending.len(), "refresh settled, draining queue");
        for waiter in pending {
            // A waiter whose request was dropped is just gone; the
            // rest of the queue still gets its outcome.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
