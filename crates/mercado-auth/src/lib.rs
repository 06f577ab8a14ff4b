//! Identity and credential layer for Mercado.
//!
//! This crate is the bottom of the client stack. It defines:
//!
//! - **Types** ([`Session`], [`UserIdentity`]) — the immutable snapshot
//!   of "who is logged in" that every other layer passes around.
//! - **The identity-provider seam** ([`IdentityProvider`] trait,
//!   [`AuthEvent`]) — how credentials are fetched and refreshed.
//!   Mercado never issues credentials itself.
//! - **Token Provider** ([`TokenProvider`]) — hands out a credential
//!   guaranteed to be valid for at least the refresh safety margin,
//!   refreshing proactively (and exactly once, no matter how many
//!   callers race) when the cached one is close to expiry.
//! - **Legacy credential store** ([`CredentialStore`] trait) — a
//!   two-key durable fallback used only by the old direct-login path.
//!
//! # How it fits in the stack
//!
//! ```text
//! HTTP Client Core (above)  ← asks TokenProvider for a bearer credential
//!     ↕
//! Auth Layer (this crate)   ← caches the session, refreshes near expiry
//!     ↕
//! Identity Provider (below) ← external service, reached via the trait seam
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod provider;
mod store;
mod token;
mod types;

pub use error::AuthError;
pub use provider::{AuthEvent, IdentityProvider};
pub use store::{CredentialStore, FileCredentialStore, LegacyCredentials, MemoryCredentialStore};
pub use token::{REFRESH_MARGIN_SECS, TokenProvider};
pub use types::{Session, UserId, UserIdentity, unix_now};
