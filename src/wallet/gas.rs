//! Gas / fee estimation
//!
//! EIP-1559 chains get `max_fee_per_gas = base_fee + priority_fee` with the
//! priority fee taken from [`FeeConfig`]. Chains without a fee market go
//! through [`flat_fee_fallback`]. Any [`FeeOverride`](crate::intent::FeeOverride)
//! field wins over the estimated value. A node that rejects
//! `eth_estimateGas` (a reverting call) gets the plain transfer gas limit so
//! the failed simulation can still be reported.

use super::simulator::call_object;
use crate::amount::parse_quantity;
use crate::chain::{Chain, FeeModel};
use crate::config::FeeConfig;
use crate::intent::{GasEstimate, TransactionIntent};
use crate::rpc::{fetch_base_fee, methods, ChainRpc};
use crate::{Error, Result};
use alloy::primitives::U256;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Gas of a plain value transfer
const TRANSFER_GAS_LIMIT: u64 = 21_000;
/// Segwit transaction overhead in vbytes (version, locktime, counts, marker)
const TX_OVERHEAD_VBYTES: u64 = 11;
/// Vbytes per P2WPKH input, witness discounted
const P2WPKH_INPUT_VBYTES: u64 = 68;
/// Vbytes per P2WPKH output
const P2WPKH_OUTPUT_VBYTES: u64 = 31;

/// Approximate virtual size of a P2WPKH transaction
pub fn estimate_vsize(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_VBYTES
        + P2WPKH_INPUT_VBYTES * inputs as u64
        + P2WPKH_OUTPUT_VBYTES * outputs as u64
}

/// Produces the fee parameters for an intent
#[async_trait]
pub trait FeeEstimator: Send + Sync {
    async fn estimate_gas(&self, intent: &TransactionIntent) -> Result<GasEstimate>;
}

/// Routes each chain to its fee model
pub struct FeeRouter {
    rpc: Arc<dyn ChainRpc>,
    config: FeeConfig,
}

impl FeeRouter {
    pub fn new(rpc: Arc<dyn ChainRpc>, config: FeeConfig) -> Self {
        Self { rpc, config }
    }

    async fn estimate_eip1559(&self, intent: &TransactionIntent) -> Result<GasEstimate> {
        let overrides = intent.fee_override.clone().unwrap_or_default();

        let gas_limit = match overrides.gas_limit {
            Some(limit) => limit,
            None => match self
                .rpc
                .call(methods::ETH_ESTIMATE_GAS, json!([call_object(intent)]))
                .await
            {
                Ok(estimate) => parse_quantity(&estimate)?,
                Err(Error::Rpc { message, .. }) => {
                    tracing::warn!(%message, "Gas estimation rejected, using transfer gas limit");
                    U256::from(TRANSFER_GAS_LIMIT)
                }
                Err(e) => return Err(e),
            },
        };

        let priority = overrides
            .max_priority_fee_per_gas
            .unwrap_or_else(|| U256::from(self.config.priority_fee_wei));

        let max_fee = match overrides.max_fee_per_gas {
            Some(max_fee) => max_fee,
            None => {
                let base_fee = fetch_base_fee(self.rpc.as_ref()).await?;
                tracing::debug!(%base_fee, %priority, "Fetched base fee");
                base_fee.saturating_add(priority)
            }
        };

        Ok(GasEstimate {
            gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority,
        })
    }
}

#[async_trait]
impl FeeEstimator for FeeRouter {
    async fn estimate_gas(&self, intent: &TransactionIntent) -> Result<GasEstimate> {
        let estimate = match intent.chain.fee_model() {
            FeeModel::Eip1559 => self.estimate_eip1559(intent).await?,
            FeeModel::Flat => flat_fee_fallback(intent, &self.config),
        };

        tracing::info!(
            chain = %intent.chain,
            gas_limit = %estimate.gas_limit,
            max_fee_per_gas = %estimate.max_fee_per_gas,
            max_priority_fee_per_gas = %estimate.max_priority_fee_per_gas,
            "Fee estimate ready"
        );
        Ok(estimate)
    }
}

/// Flat-fee fallback for chains without a base/priority fee market.
///
/// Bitcoin: estimated vsize × sat/vbyte (payment plus change output).
/// Solana: one signature × lamports/signature.
pub fn flat_fee_fallback(intent: &TransactionIntent, config: &FeeConfig) -> GasEstimate {
    let (units, rate) = match intent.chain {
        Chain::Bitcoin => {
            let inputs = intent.utxos().map(|u| u.len()).unwrap_or(0).max(1);
            (estimate_vsize(inputs, 2), config.sat_per_vbyte)
        }
        Chain::Solana => (1, config.lamports_per_signature),
        Chain::Ethereum => (TRANSFER_GAS_LIMIT, config.priority_fee_wei),
    };
    tracing::debug!(chain = %intent.chain, units, rate, "Using flat fee fallback");

    let overrides = intent.fee_override.clone().unwrap_or_default();
    GasEstimate::flat(
        overrides.gas_limit.unwrap_or(U256::from(units)),
        overrides.max_fee_per_gas.unwrap_or(U256::from(rate)),
    )
}
