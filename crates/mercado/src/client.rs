//! `MercadoClient` builder and wiring.
//!
//! This is the composition root: it builds the one-instance-per-process
//! components (session store, token provider, the two HTTP cores) and
//! connects the terminal-auth-failure path — when a 401 survives its
//! refresh-and-replay, the session store is cleared and the embedding
//! application's sign-out callback (a login redirect, typically) fires.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use mercado_auth::{CredentialStore, IdentityProvider, TokenProvider};
use mercado_http::{ApiError, ApiRequest, ClientConfig, HttpClient, SignOutHook};
use mercado_session::SessionStore;

use crate::MercadoConfig;

/// The sign-out callback the embedding application installs — usually
/// "navigate to the login page". The application decides whether it is
/// already on an auth surface and skips the redirect there.
type SignOutCallback = Arc<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// SessionSignOut
// ---------------------------------------------------------------------------

/// The facade's [`SignOutHook`]: clears the session store (which
/// notifies every subscriber synchronously) and then invokes the
/// application callback.
struct SessionSignOut<P> {
    session: SessionStore<P>,
    callback: Option<SignOutCallback>,
}

impl<P: IdentityProvider> SignOutHook for SessionSignOut<P> {
    fn on_auth_expired(&self) {
        info!("authentication expired, signing out locally");
        self.session.clear_session();
        if let Some(callback) = &self.callback {
            callback();
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`MercadoClient`].
///
/// # Example
///
/// ```rust,ignore
/// let client = MercadoClient::builder(MercadoConfig::from_env()?)
///     .legacy_store(Arc::new(FileCredentialStore::new(path)))
///     .on_sign_out(|| redirect_to_login())
///     .build(provider);
/// ```
pub struct MercadoClientBuilder {
    config: MercadoConfig,
    legacy_store: Option<Arc<dyn CredentialStore>>,
    on_sign_out: Option<SignOutCallback>,
}

impl MercadoClientBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(config: MercadoConfig) -> Self {
        Self {
            config,
            legacy_store: None,
            on_sign_out: None,
        }
    }

    /// Attaches the durable legacy credential store (the old
    /// direct-login fallback).
    pub fn legacy_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.legacy_store = Some(store);
        self
    }

    /// Installs the application's sign-out callback, invoked after a
    /// terminal auth failure has cleared local state.
    pub fn on_sign_out(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_sign_out = Some(Arc::new(callback));
        self
    }

    /// Builds the client stack around the given identity provider.
    pub fn build<P: IdentityProvider>(self, provider: Arc<P>) -> MercadoClient<P> {
        let mut tokens = TokenProvider::new(Arc::clone(&provider));
        if let Some(store) = self.legacy_store {
            tokens = tokens.with_legacy_store(store);
        }
        let tokens = Arc::new(tokens);

        let session = SessionStore::new(provider);
        let hook: Arc<dyn SignOutHook> = Arc::new(SessionSignOut {
            session: session.clone(),
            callback: self.on_sign_out,
        });

        let api = Arc::new(
            HttpClient::new(ClientConfig::new(self.config.api_url), Arc::clone(&tokens))
                .with_sign_out_hook(Arc::clone(&hook)),
        );
        let auth_api = Arc::new(
            HttpClient::new(
                ClientConfig::new(self.config.auth_api_url),
                Arc::clone(&tokens),
            )
            .with_sign_out_hook(hook),
        );

        MercadoClient {
            api,
            auth_api,
            session,
            tokens,
        }
    }
}

// ---------------------------------------------------------------------------
// MercadoClient
// ---------------------------------------------------------------------------

/// The assembled client stack. One instance per process; clones of the
/// inner handles are shared by every consumer.
pub struct MercadoClient<P> {
    api: Arc<HttpClient<P>>,
    auth_api: Arc<HttpClient<P>>,
    session: SessionStore<P>,
    tokens: Arc<TokenProvider<P>>,
}

impl<P: IdentityProvider> MercadoClient<P> {
    /// Creates a builder.
    pub fn builder(config: MercadoConfig) -> MercadoClientBuilder {
        MercadoClientBuilder::new(config)
    }

    /// Sends a request to the main API. Shorthand for `api().send(..)`.
    ///
    /// # Errors
    /// See [`HttpClient::send`].
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.api.send(request).await
    }

    /// The main API client core.
    pub fn api(&self) -> &HttpClient<P> {
        &self.api
    }

    /// The identity-linked API client core (login, registration,
    /// refresh endpoints live here).
    pub fn auth_api(&self) -> &HttpClient<P> {
        &self.auth_api
    }

    /// The process-wide session store.
    pub fn session(&self) -> &SessionStore<P> {
        &self.session
    }

    /// The token provider shared by both API cores.
    pub fn tokens(&self) -> &Arc<TokenProvider<P>> {
        &self.tokens
    }
}
