//! # Mercado Client
//!
//! The client-side session and API resilience stack for Mercado apps.
//!
//! One [`MercadoClient`] per process wires together:
//!
//! - a [`SessionStore`](mercado_session::SessionStore) — the single
//!   authoritative "who is logged in" record every consumer subscribes to,
//! - a [`TokenProvider`](mercado_auth::TokenProvider) — credentials
//!   refreshed proactively before expiry, deduplicated under concurrency,
//! - two [`HttpClient`](mercado_http::HttpClient) cores (main API and
//!   identity-linked API) — caching reads, retrying transient failures,
//!   and coordinating 401 refresh-and-replay process-wide.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mercado::prelude::*;
//!
//! # async fn run<P: IdentityProvider>(provider: Arc<P>) -> Result<(), MercadoError> {
//! let config = MercadoConfig::from_env()?;
//! let client = MercadoClient::<P>::builder(config).build(provider);
//!
//! // Consumers subscribe once and share the same identity record.
//! let _sub = client.session().subscribe(|snapshot| {
//!     tracing::info!(authenticated = snapshot.is_authenticated(), "session changed");
//! });
//!
//! // API calls flow through the resilient pipeline.
//! let listing = client.send(ApiRequest::get("/items/42").cached()).await?;
//! # let _ = listing;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::{MercadoClient, MercadoClientBuilder};
pub use config::{API_URL_ENV, AUTH_API_URL_ENV, ConfigError, MercadoConfig};
pub use error::MercadoError;

/// The convenient single-import surface.
pub mod prelude {
    pub use crate::{MercadoClient, MercadoClientBuilder, MercadoConfig, MercadoError};
    pub use mercado_auth::{
        AuthEvent, CredentialStore, IdentityProvider, Session, TokenProvider, UserIdentity,
    };
    pub use mercado_http::{ApiError, ApiRequest, HttpClient};
    pub use mercado_session::{SessionStore, Snapshot, StorePhase};
}
