//! Unified error type for the Mercado client stack.

use mercado_auth::AuthError;
use mercado_http::ApiError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `mercado` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MercadoError {
    /// An API-level error (normalized transport and backend failures).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An auth-level error (identity provider, credential store).
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A configuration error (bad base URL override).
    #[error(transparent)]
    Config(#[from] ConfigError),
}
