//! Configuration: base URLs and their environment overrides.
//!
//! Only the two base URLs are configurable from the environment. The
//! numeric constants (cache TTL, timeouts, retry caps, refresh margin)
//! are fixed configuration values owned by the crates that use them —
//! they are deliberately not runtime-tunable.

use url::Url;

/// Environment variable overriding the main API base URL.
pub const API_URL_ENV: &str = "MERCADO_API_URL";

/// Environment variable overriding the identity-linked API base URL.
pub const AUTH_API_URL_ENV: &str = "MERCADO_AUTH_API_URL";

const DEFAULT_API_URL: &str = "https://api.mercado.app";
const DEFAULT_AUTH_API_URL: &str = "https://id.mercado.app";

/// Errors raised while assembling configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An override contained something that is not a URL.
    #[error("invalid URL in {var}: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Base URLs for the two backend surfaces.
#[derive(Debug, Clone)]
pub struct MercadoConfig {
    /// The main API (listings, messaging, search, prediction).
    pub api_url: Url,

    /// The identity-linked API (login, registration, refresh).
    pub auth_api_url: Url,
}

impl MercadoConfig {
    /// Creates a config with explicit base URLs.
    pub fn new(api_url: Url, auth_api_url: Url) -> Self {
        Self {
            api_url,
            auth_api_url,
        }
    }

    /// Reads the config from the environment, falling back to the
    /// production defaults for any variable that is unset.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidUrl`] if a set variable does not
    /// parse as a URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(AUTH_API_URL_ENV).ok(),
        )
    }

    fn from_vars(api: Option<String>, auth: Option<String>) -> Result<Self, ConfigError> {
        let api_url = match api {
            Some(raw) => Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
                var: API_URL_ENV,
                source,
            })?,
            None => Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
        };
        let auth_api_url = match auth {
            Some(raw) => Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
                var: AUTH_API_URL_ENV,
                source,
            })?,
            None => Url::parse(DEFAULT_AUTH_API_URL).expect("default auth URL is valid"),
        };
        Ok(Self {
            api_url,
            auth_api_url,
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
