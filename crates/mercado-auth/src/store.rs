//! Durable storage for the legacy direct-login credential.
//!
//! Before the identity provider existed, the app had its own login
//! endpoint that handed back a long-lived access/refresh token pair,
//! persisted in a local key-value store. That path still works, and the
//! token provider falls back to it — but only when the provider session
//! is entirely absent.
//!
//! This layer reads and writes exactly two keys. Nothing else belongs
//! in the store, so the trait deals in a single [`LegacyCredentials`]
//! pair rather than a general KV interface.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::AuthError;

/// The legacy token pair: a bearer credential plus its refresh companion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyCredentials {
    /// Long-lived bearer credential from the legacy login endpoint.
    pub access_token: String,

    /// Companion refresh credential, if the legacy endpoint issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Where the legacy credential pair lives.
///
/// Synchronous on purpose: the backing stores (a local file here, a
/// browser key-value store in the original environment) are cheap
/// same-process reads, and keeping the trait sync keeps it out of the
/// async single-flight machinery above it.
pub trait CredentialStore: Send + Sync + 'static {
    /// Loads the stored pair, or `None` if nothing is stored.
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] if the store is unreadable or the
    /// stored data is corrupt.
    fn load(&self) -> Result<Option<LegacyCredentials>, AuthError>;

    /// Persists the pair, replacing whatever was stored.
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] if the store cannot be written.
    fn save(&self, credentials: &LegacyCredentials) -> Result<(), AuthError>;

    /// Removes the stored pair. Clearing an empty store is a no-op.
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] if the store cannot be written.
    fn clear(&self) -> Result<(), AuthError>;
}

// ---------------------------------------------------------------------------
// FileCredentialStore
// ---------------------------------------------------------------------------

/// A [`CredentialStore`] backed by a single JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store backed by the given file path. The file is not
    /// created until the first `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<LegacyCredentials>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(AuthError::Store(e.to_string())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    fn save(&self, credentials: &LegacyCredentials) -> Result<(), AuthError> {
        let raw = serde_json::to_string(credentials)
            .map_err(|e| AuthError::Store(e.to_string()))?;
        fs::write(&self.path, raw).map_err(|e| AuthError::Store(e.to_string()))
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::Store(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// An in-memory [`CredentialStore`] for tests and ephemeral processes.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<LegacyCredentials>>,
}

impl MemoryCredentialStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<LegacyCredentials>, AuthError> {
        Ok(self.inner.lock().expect("store lock poisoned").clone())
    }

    fn save(&self, credentials: &LegacyCredentials) -> Result<(), AuthError> {
        *self.inner.lock().expect("store lock poisoned") = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.inner.lock().expect("store lock poisoned") = None;
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> LegacyCredentials {
        LegacyCredentials {
            access_token: "legacy-access".into(),
            refresh_token: Some("legacy-refresh".into()),
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.load().unwrap(), None);

        store.save(&creds()).unwrap();
        assert_eq!(store.load().unwrap(), Some(creds()));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("creds.json"));

        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("creds.json"));

        store.save(&creds()).unwrap();
        assert_eq!(store.load().unwrap(), Some(creds()));
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("creds.json"));

        store.save(&creds()).unwrap();
        store.clear().unwrap();
        // Clearing again should not error on the missing file.
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_corrupt_data_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileCredentialStore::new(path);

        assert!(matches!(store.load(), Err(AuthError::Store(_))));
    }

    #[test]
    fn test_refresh_token_is_optional_in_stored_json() {
        // Old installs may have stored only the access token.
        let parsed: LegacyCredentials =
            serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(parsed.refresh_token, None);
    }
}
