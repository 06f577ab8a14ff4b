//! Process-wide session store for Mercado.
//!
//! This crate answers one question for every consumer in the process —
//! "who is logged in right now?" — without each consumer fetching the
//! identity on its own:
//!
//! 1. **Snapshots** — [`Snapshot`] is the immutable `{session,
//!    session_loaded}` view handed to consumers ([`SessionStore::snapshot`]).
//! 2. **Subscriptions** — consumers register a listener and are notified
//!    on every state transition ([`SessionStore::subscribe`]).
//! 3. **Deduplicated initialization** — the first access triggers exactly
//!    one identity fetch, no matter how many consumers race.
//! 4. **Refresh** — explicit after known mutations ([`SessionStore::refresh`]),
//!    or best-effort on external signals like window refocus
//!    ([`SessionStore::watch_signal`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Consumers (above)         ← subscribe, read snapshots
//!     ↕
//! Session Store (this crate) ← one authoritative record per process
//!     ↕
//! Auth Layer (below)         ← IdentityProvider seam, Session type
//! ```

mod snapshot;
mod store;

pub use snapshot::{Snapshot, StorePhase};
pub use store::{SessionStore, SignalWatcher, Subscription};
