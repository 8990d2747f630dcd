//! Secret store contract
//!
//! SECURITY: the root secret (a BIP-39 mnemonic phrase) is only ever handed
//! out as a [`SecretBytes`] buffer that zeroizes itself on drop. Callers hold
//! it for the duration of one operation and never copy it into plain buffers.

use crate::{Error, Result};
use async_trait::async_trait;
use secrecy::SecretSlice;
use std::collections::{HashMap, HashSet};
use zeroize::Zeroizing;

/// Wipeable secret buffer (redacted `Debug`, zeroized on drop)
pub type SecretBytes = SecretSlice<u8>;

/// Source of root secrets, keyed by account id
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret for `id`.
    ///
    /// Fails with [`Error::NotFound`] when no secret exists and
    /// [`Error::AccessDenied`] when the store refuses to release it.
    async fn get_secret(&self, id: &str) -> Result<SecretBytes>;
}

/// In-process secret store
///
/// Platform keychains are out of scope; this store backs the CLI and tests.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: HashMap<String, Zeroizing<Vec<u8>>>,
    denied: HashSet<String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `secret` under `id`, replacing any previous value
    pub fn insert(&mut self, id: impl Into<String>, secret: impl Into<Vec<u8>>) {
        self.secrets.insert(id.into(), Zeroizing::new(secret.into()));
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with_secret(mut self, id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.insert(id, secret);
        self
    }

    /// Refuse access to `id` even if a secret is stored for it
    pub fn deny(&mut self, id: impl Into<String>) {
        self.denied.insert(id.into());
    }

    /// Load a mnemonic from an environment variable
    ///
    /// # Security
    /// The environment variable should contain a BIP-39 phrase.
    /// Consider using a secrets manager in production.
    pub fn from_env(var_name: &str, id: &str) -> Result<Self> {
        let phrase = Zeroizing::new(std::env::var(var_name).map_err(|_| {
            Error::Config(format!(
                "Environment variable {} not set. Required for wallet initialization.",
                var_name
            ))
        })?);

        let mut store = Self::new();
        store.insert(id, phrase.trim().as_bytes().to_vec());
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, id: &str) -> Result<SecretBytes> {
        if self.denied.contains(id) {
            tracing::warn!(id, "Secret access denied");
            return Err(Error::AccessDenied(id.to_string()));
        }
        let secret = self
            .secrets
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(SecretBytes::from(secret.to_vec()))
    }
}

// Implement Debug manually to avoid exposing stored secrets
impl std::fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("ids", &self.secrets.keys().collect::<Vec<_>>())
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn returns_stored_secret() {
        let store = MemorySecretStore::new().with_secret("main", "correct horse");
        let secret = store.get_secret("main").await.unwrap();
        assert_eq!(secret.expose_secret(), b"correct horse");
    }

    #[tokio::test]
    async fn missing_and_denied_are_distinct() {
        let mut store = MemorySecretStore::new().with_secret("locked", "x");
        store.deny("locked");

        assert!(matches!(store.get_secret("nope").await, Err(Error::NotFound(_))));
        assert!(matches!(store.get_secret("locked").await, Err(Error::AccessDenied(_))));
    }

    #[test]
    fn debug_redacts_secrets() {
        let store = MemorySecretStore::new().with_secret("main", "abandon abandon");
        let debug = format!("{:?}", store);
        assert!(debug.contains("main"));
        assert!(!debug.contains("abandon"));
        assert!(debug.contains("[REDACTED]"));
    }
}
