//! Snapshot types: what consumers see when they read the store.

use mercado_auth::{Session, UserIdentity};

// ---------------------------------------------------------------------------
// StorePhase
// ---------------------------------------------------------------------------

/// The lifecycle phase of the session store.
///
/// This is a one-way state machine up to the first resolution:
///
/// ```text
///   Uninitialized ──→ Loading ──→ Authenticated ⇄ Anonymous
/// ```
///
/// - **Uninitialized**: No consumer has touched the store yet.
/// - **Loading**: The one-and-only initial identity fetch is in flight.
/// - **Authenticated** / **Anonymous**: Terminal phases. Refreshes swap
///   directly between them — the store never re-enters `Loading`, so a
///   consumer that has seen `session_loaded == true` will never observe
///   a loading state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    /// Nothing has happened yet.
    Uninitialized,
    /// The initial identity fetch is in flight.
    Loading,
    /// A user is signed in.
    Authenticated,
    /// Nobody is signed in (or the initial fetch failed).
    Anonymous,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable view of the store's state at one instant.
///
/// Handed to consumers by value; the store replaces its state rather
/// than mutating it, so a snapshot never changes after it is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// The current session, or `None` when anonymous.
    pub session: Option<Session>,

    /// `false` until the initial identity fetch settles, then `true`
    /// forever — regardless of whether that fetch succeeded. Consumers
    /// use this to distinguish "still loading" from "not signed in"
    /// and must never see it flip back.
    pub session_loaded: bool,

    /// Which lifecycle phase produced this snapshot.
    pub phase: StorePhase,
}

impl Snapshot {
    /// The signed-in user, if any.
    pub fn user(&self) -> Option<&UserIdentity> {
        self.session.as_ref().map(|s| &s.user)
    }

    /// `true` when a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}
