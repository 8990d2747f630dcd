//! Configuration for the wallet pipeline

pub mod rpc;

use crate::chain::Chain;
use crate::risk::Severity;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable holding the root mnemonic for the CLI
pub const WALLET_MNEMONIC_ENV: &str = "WALLET_MNEMONIC";

/// Solana base fee per signature
pub const DEFAULT_LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Fee policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// EIP-1559 priority fee (tip) in wei
    pub priority_fee_wei: u64,
    /// Bitcoin fee rate
    pub sat_per_vbyte: u64,
    /// Solana fee per signature
    pub lamports_per_signature: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            priority_fee_wei: 1_500_000_000, // 1.5 gwei
            sat_per_vbyte: 10,
            lamports_per_signature: DEFAULT_LAMPORTS_PER_SIGNATURE,
        }
    }
}

/// Risk analysis thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Transfers above these amounts (display units, e.g. "10") raise an alert
    pub large_transfer: HashMap<Chain, String>,
    /// Gas limits above this raise an alert (EVM only)
    pub high_gas_limit: u64,
    /// Alerts at or above this severity are reported to breach hooks
    pub breach_severity: Severity,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            large_transfer: HashMap::from([
                (Chain::Ethereum, "10".to_string()),
                (Chain::Bitcoin, "0.5".to_string()),
                (Chain::Solana, "500".to_string()),
            ]),
            high_gas_limit: 500_000,
            breach_severity: Severity::High,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bound on every RPC round trip (milliseconds)
    pub rpc_timeout_ms: u64,
    /// Fee policy
    pub fees: FeeConfig,
    /// Risk analysis settings
    pub risk: RiskConfig,
    /// Path to the breach audit log (JSONL), disabled when unset
    pub audit_log_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 10_000,
            fees: FeeConfig::default(),
            risk: RiskConfig::default(),
            audit_log_path: Some("audit.jsonl".to_string()),
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
