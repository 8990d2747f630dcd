//! Sentinel Wallet
//!
//! A self-custodial wallet pipeline that moves every transfer through:
//! - Simulation against the chain (read-only)
//! - Fee estimation (EIP-1559 or a flat-fee fallback)
//! - Rule-based risk analysis
//! - Signing with keys derived per operation and wiped afterwards
//! - Broadcast
//!
//! # Security Model
//!
//! - The root secret lives in a [`SecretStore`](secret::SecretStore) and is
//!   only unwrapped inside the signer
//! - Derived private keys are zeroized on every exit path
//! - Signing only proceeds from a simulated and analyzed `prepared` state
//! - The root secret can be backed up as T-of-N recovery shares

pub mod amount;
pub mod chain;
pub mod config;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod recovery;
pub mod risk;
pub mod rpc;
pub mod secret;
pub mod wallet;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use amount::Balance;
pub use chain::Chain;
pub use config::{Config, RpcConfig, WALLET_MNEMONIC_ENV};
pub use error::{Error, ErrorKind, FailureReport, Result};
pub use intent::{ChainData, GasEstimate, SignedTransaction, TransactionIntent, TransferRequest};
pub use orchestrator::{Dependencies, OrchestratorConfig, OrchestratorState, WalletOrchestrator};
pub use recovery::{generate_shares, reconstruct, RecoveryShare};
pub use risk::{RiskAlert, RiskAnalyzer, Severity};
