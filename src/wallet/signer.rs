//! Secure signer
//!
//! SECURITY: This is the ONLY place where private keys exist.
//! - Keys are derived from the root secret per operation and wiped on drop
//! - Keys are never serialized, returned or logged
//! - Intents are validated before the secret store is touched

use super::derivation::{derive_private_key, PrivateKey};
use crate::chain::Chain;
use crate::intent::{GasEstimate, SignedTransaction, TransactionIntent};
use crate::secret::SecretStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Chain-native address derivation, encoding and signing
pub trait ChainBackend: Send + Sync {
    fn chain(&self) -> Chain;

    /// Public address for `key`
    fn address(&self, key: &PrivateKey) -> Result<String>;

    /// Reject intents that cannot be signed. Must not touch the network.
    fn validate(&self, intent: &TransactionIntent) -> Result<()>;

    /// Encode and sign `intent`
    fn sign(
        &self,
        key: &PrivateKey,
        intent: &TransactionIntent,
        gas: &GasEstimate,
    ) -> Result<SignedTransaction>;
}

/// Placeholder for a chain whose signing backend is not available.
/// Every operation fails with [`Error::BackendUnavailable`].
#[derive(Debug, Clone, Copy)]
pub struct UnavailableBackend {
    chain: Chain,
}

impl UnavailableBackend {
    pub fn new(chain: Chain) -> Self {
        Self { chain }
    }
}

impl ChainBackend for UnavailableBackend {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn address(&self, _key: &PrivateKey) -> Result<String> {
        Err(Error::BackendUnavailable(self.chain))
    }

    fn validate(&self, _intent: &TransactionIntent) -> Result<()> {
        Err(Error::BackendUnavailable(self.chain))
    }

    fn sign(
        &self,
        _key: &PrivateKey,
        _intent: &TransactionIntent,
        _gas: &GasEstimate,
    ) -> Result<SignedTransaction> {
        Err(Error::BackendUnavailable(self.chain))
    }
}

/// Signing capability handed to the orchestrator
#[async_trait]
pub trait Signer: Send + Sync {
    /// Address of the account `secret_id` on `chain`
    async fn address(&self, secret_id: &str, chain: Chain) -> Result<String>;

    /// Sign `intent` for its chain with the key derived from `secret_id`
    async fn sign(
        &self,
        secret_id: &str,
        intent: &TransactionIntent,
        gas: &GasEstimate,
    ) -> Result<SignedTransaction>;
}

/// HD wallet signer over a [`SecretStore`]
///
/// Each operation runs validate → fetch secret → derive → sign, and the
/// secret and derived key are dropped (zeroized) before it returns, whether
/// it succeeds or fails.
pub struct HdSigner {
    secrets: Arc<dyn SecretStore>,
    backends: HashMap<Chain, Box<dyn ChainBackend>>,
}

impl HdSigner {
    /// Signer with the built-in backend for every supported chain
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self::without_backends(secrets)
            .with_backend(super::EvmBackend)
            .with_backend(super::BitcoinBackend)
            .with_backend(super::SolanaBackend)
    }

    pub fn without_backends(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            backends: HashMap::new(),
        }
    }

    /// Register `backend` for its chain, replacing any existing one
    pub fn with_backend(mut self, backend: impl ChainBackend + 'static) -> Self {
        self.backends.insert(backend.chain(), Box::new(backend));
        self
    }

    fn backend(&self, chain: Chain) -> Result<&dyn ChainBackend> {
        self.backends
            .get(&chain)
            .map(|b| b.as_ref())
            .ok_or(Error::BackendUnavailable(chain))
    }

    async fn unlock(&self, secret_id: &str, chain: Chain) -> Result<PrivateKey> {
        let secret = self.secrets.get_secret(secret_id).await?;
        derive_private_key(&secret, chain)
    }
}

#[async_trait]
impl Signer for HdSigner {
    async fn address(&self, secret_id: &str, chain: Chain) -> Result<String> {
        let backend = self.backend(chain)?;
        let key = self.unlock(secret_id, chain).await?;
        backend.address(&key)
    }

    async fn sign(
        &self,
        secret_id: &str,
        intent: &TransactionIntent,
        gas: &GasEstimate,
    ) -> Result<SignedTransaction> {
        let backend = self.backend(intent.chain)?;
        backend.validate(intent)?;

        let key = self.unlock(secret_id, intent.chain).await?;
        let signed = backend.sign(&key, intent, gas);
        drop(key);

        match &signed {
            Ok(tx) => tracing::info!(chain = %intent.chain, tx_hash = %tx.hash, "Transaction signed"),
            Err(e) => tracing::warn!(chain = %intent.chain, error = %e, "Signing failed"),
        }
        signed
    }
}

// Implement Debug manually to avoid exposing the secret store
impl std::fmt::Debug for HdSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdSigner")
            .field("chains", &self.backends.keys().collect::<Vec<_>>())
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}
