//! Transaction simulation before signing
//!
//! Uses read-only RPC calls to evaluate an intent before it is signed:
//! - Catch reverts early with readable reasons
//! - Estimate gas usage
//! - Report the expected balance changes
//!
//! SECURITY NOTE:
//! - This module is read-only - it never signs or submits transactions
//! - Simulation uses the sender's public address only
//!
//! An intent the chain would reject is a successful call returning
//! `success = false`. Only transport and parsing failures are errors.

use super::gas::estimate_vsize;
use crate::amount::{decimal_u256, parse_quantity, signed_delta};
use crate::chain::Chain;
use crate::intent::TransactionIntent;
use crate::rpc::{fetch_balance, methods, ChainRpc};
use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of simulating a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Whether the chain would accept the transaction
    pub success: bool,
    /// Gas (or vbytes / signatures) the transaction is expected to use
    #[serde(with = "decimal_u256")]
    pub estimated_gas_used: U256,
    /// Address → signed base-unit delta
    pub balance_changes: BTreeMap<String, String>,
    /// Revert or rejection reason (if failed)
    pub error: Option<String>,
}

impl SimulationResult {
    /// Create a successful simulation result
    pub fn success(estimated_gas_used: U256, balance_changes: BTreeMap<String, String>) -> Self {
        Self {
            success: true,
            estimated_gas_used,
            balance_changes,
            error: None,
        }
    }

    /// Create a failed simulation result
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            estimated_gas_used: U256::ZERO,
            balance_changes: BTreeMap::new(),
            error: Some(reason.into()),
        }
    }
}

/// Read-only evaluation of an intent
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, intent: &TransactionIntent) -> Result<SimulationResult>;
}

/// Simulator backed by a chain RPC endpoint
pub struct RpcSimulator {
    rpc: Arc<dyn ChainRpc>,
    /// Solana fee per signature, reserved when checking coverage
    lamports_per_signature: u64,
}

impl RpcSimulator {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            rpc,
            lamports_per_signature: crate::config::DEFAULT_LAMPORTS_PER_SIGNATURE,
        }
    }

    pub fn with_lamports_per_signature(mut self, lamports: u64) -> Self {
        self.lamports_per_signature = lamports;
        self
    }

    async fn simulate_evm(&self, intent: &TransactionIntent) -> Result<SimulationResult> {
        let tx = call_object(intent);

        // First, try eth_call to check if it reverts
        match self
            .rpc
            .call(methods::ETH_CALL, json!([tx.clone(), "latest"]))
            .await
        {
            Ok(_) => {}
            Err(Error::Rpc { message, .. }) => {
                return Ok(SimulationResult::failed(parse_revert_reason(&message)))
            }
            Err(e) => return Err(e),
        }

        // Call succeeded, now estimate gas
        let gas_used = match self.rpc.call(methods::ETH_ESTIMATE_GAS, json!([tx])).await {
            Ok(value) => parse_quantity(&value)?,
            Err(Error::Rpc { message, .. }) => {
                return Ok(SimulationResult::failed(parse_revert_reason(&message)))
            }
            Err(e) => return Err(e),
        };

        Ok(SimulationResult::success(gas_used, transfer_deltas(intent)))
    }

    fn simulate_bitcoin(&self, intent: &TransactionIntent) -> Result<SimulationResult> {
        let utxos = match intent.utxos() {
            Some(utxos) if !utxos.is_empty() => utxos,
            _ => return Ok(SimulationResult::failed("no inputs supplied")),
        };

        let total_in = utxos
            .iter()
            .fold(U256::ZERO, |acc, u| acc.saturating_add(U256::from(u.value_sat)));
        if total_in < intent.value {
            return Ok(SimulationResult::failed(format!(
                "insufficient funds: inputs total {} sat, sending {} sat",
                total_in, intent.value
            )));
        }

        let vsize = estimate_vsize(utxos.len(), 2);
        Ok(SimulationResult::success(U256::from(vsize), transfer_deltas(intent)))
    }

    async fn simulate_solana(&self, intent: &TransactionIntent) -> Result<SimulationResult> {
        let balance = fetch_balance(self.rpc.as_ref(), Chain::Solana, &intent.from).await?;
        let required = intent
            .value
            .saturating_add(U256::from(self.lamports_per_signature));
        if balance < required {
            return Ok(SimulationResult::failed(format!(
                "insufficient funds: balance {} lamports, required {} lamports",
                balance, required
            )));
        }
        Ok(SimulationResult::success(U256::from(1u64), transfer_deltas(intent)))
    }
}

#[async_trait]
impl Simulator for RpcSimulator {
    async fn simulate(&self, intent: &TransactionIntent) -> Result<SimulationResult> {
        let result = match intent.chain {
            Chain::Ethereum => self.simulate_evm(intent).await?,
            Chain::Bitcoin => self.simulate_bitcoin(intent)?,
            Chain::Solana => self.simulate_solana(intent).await?,
        };

        tracing::info!(
            chain = %intent.chain,
            success = result.success,
            gas = %result.estimated_gas_used,
            error = result.error.as_deref().unwrap_or(""),
            "Simulation complete"
        );
        Ok(result)
    }
}

/// `eth_call` / `eth_estimateGas` transaction object for an intent
pub(crate) fn call_object(intent: &TransactionIntent) -> Value {
    let mut tx = json!({
        "from": intent.from,
        "to": intent.to,
        "value": format!("0x{:x}", intent.value),
    });
    if let Some(data) = intent.call_data() {
        tx["data"] = json!(format!("0x{}", hex::encode(data)));
    }
    tx
}

/// Sender pays `value`, recipient receives it. Fees are reported separately.
fn transfer_deltas(intent: &TransactionIntent) -> BTreeMap<String, String> {
    let mut changes = BTreeMap::new();
    if intent.value.is_zero() || intent.from.eq_ignore_ascii_case(&intent.to) {
        return changes;
    }
    changes.insert(intent.from.clone(), signed_delta(intent.value, true));
    changes.insert(intent.to.clone(), signed_delta(intent.value, false));
    changes
}

/// Extract a readable reason from an RPC rejection message
fn parse_revert_reason(error: &str) -> String {
    // Common patterns for revert reasons in RPC errors
    if error.contains("execution reverted") {
        if let Some((_, reason)) = error.split_once("execution reverted: ") {
            let reason = reason.strip_prefix("revert: ").unwrap_or(reason);
            return reason.trim_end_matches('"').to_string();
        }
        // Error(string) revert data: selector 0x08c379a0, offset, length, bytes
        if let Some(start) = error.find("0x08c379a0") {
            let data = &error[start + 2..];
            let end = data
                .find(|c: char| !c.is_ascii_hexdigit())
                .unwrap_or(data.len());
            if let Ok(bytes) = hex::decode(&data[..end]) {
                if let Some(reason) = decode_error_string(&bytes) {
                    return reason;
                }
            }
        }
        return "execution reverted".to_string();
    }

    // Return the full error if we can't parse it
    error.to_string()
}

fn decode_error_string(data: &[u8]) -> Option<String> {
    let body = data.get(4..)?;
    let len = U256::from_be_slice(body.get(32..64)?);
    let len = usize::try_from(len).ok()?;
    let text = body.get(64..64usize.checked_add(len)?)?;
    String::from_utf8(text.to_vec()).ok()
}
