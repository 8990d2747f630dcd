//! Key derivation, signing, simulation and fee estimation
//!
//! Private keys exist only inside [`HdSigner`] for the duration of one
//! operation. Nothing in this module hands key material to callers.

pub mod bitcoin;
pub mod derivation;
pub mod encoding;
pub mod evm;
pub mod gas;
pub mod signer;
pub mod simulator;
pub mod solana;

pub use self::bitcoin::BitcoinBackend;
pub use derivation::{derive_private_key, PrivateKey};
pub use evm::EvmBackend;
pub use gas::{flat_fee_fallback, FeeEstimator, FeeRouter};
pub use signer::{ChainBackend, HdSigner, Signer, UnavailableBackend};
pub use simulator::{RpcSimulator, SimulationResult, Simulator};
pub use solana::SolanaBackend;
