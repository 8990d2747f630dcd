//! Transaction intents and the values that flow between pipeline stages

use crate::amount::decimal_u256;
use crate::chain::Chain;
use alloy::hex;
use alloy::primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An unspent output the caller offers as a Bitcoin input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Funding transaction id (big-endian hex, as shown by explorers)
    pub txid: String,
    pub vout: u32,
    pub value_sat: u64,
}

/// Chain-specific extra data attached to a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainData {
    /// Contract call data for account-based chains
    Call(Bytes),
    /// Inputs to spend on UTXO chains
    Utxos(Vec<Utxo>),
    /// Recent blockhash anchoring a Solana message
    RecentBlockhash(String),
}

/// Caller-supplied fee parameters that replace estimated ones
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeOverride {
    pub gas_limit: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// What the caller asks for: "send `value` to `to`"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub to: String,
    /// Amount in base units
    pub value: U256,
    pub data: Option<ChainData>,
    pub fee_override: Option<FeeOverride>,
}

impl TransferRequest {
    pub fn new(to: impl Into<String>, value: U256) -> Self {
        Self {
            to: to.into(),
            value,
            data: None,
            fee_override: None,
        }
    }

    pub fn with_data(mut self, data: ChainData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_fee_override(mut self, fee_override: FeeOverride) -> Self {
        self.fee_override = Some(fee_override);
        self
    }

    /// Whether an already-built intent was built from these exact parameters
    pub fn matches(&self, intent: &TransactionIntent) -> bool {
        self.to == intent.to && self.value == intent.value && self.data == intent.data
    }
}

/// A fully specified transfer, built by the orchestrator and consumed once by
/// the signer. Carries no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub chain: Chain,
    pub from: String,
    pub to: String,
    pub value: U256,
    pub data: Option<ChainData>,
    pub fee_override: Option<FeeOverride>,
    /// Account nonce, for chains that have one
    pub nonce: Option<u64>,
}

impl TransactionIntent {
    pub fn new(chain: Chain, from: impl Into<String>, request: &TransferRequest) -> Self {
        Self {
            chain,
            from: from.into(),
            to: request.to.clone(),
            value: request.value,
            data: request.data.clone(),
            fee_override: request.fee_override.clone(),
            nonce: None,
        }
    }

    pub fn call_data(&self) -> Option<&Bytes> {
        match &self.data {
            Some(ChainData::Call(data)) => Some(data),
            _ => None,
        }
    }

    pub fn utxos(&self) -> Option<&[Utxo]> {
        match &self.data {
            Some(ChainData::Utxos(utxos)) => Some(utxos),
            _ => None,
        }
    }

    pub fn recent_blockhash(&self) -> Option<&str> {
        match &self.data {
            Some(ChainData::RecentBlockhash(hash)) => Some(hash),
            _ => None,
        }
    }
}

/// Fee parameters for one transaction, in base units
///
/// For flat-fee chains `max_fee_per_gas` is the flat rate (sat/vbyte or
/// lamports/signature) and `gas_limit` the number of units it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasEstimate {
    #[serde(with = "decimal_u256")]
    pub gas_limit: U256,
    #[serde(with = "decimal_u256")]
    pub max_fee_per_gas: U256,
    #[serde(with = "decimal_u256")]
    pub max_priority_fee_per_gas: U256,
}

impl GasEstimate {
    /// Estimate for chains without a base/priority fee market
    pub fn flat(units: U256, rate: U256) -> Self {
        Self {
            gas_limit: units,
            max_fee_per_gas: rate,
            max_priority_fee_per_gas: U256::ZERO,
        }
    }

    /// Upper bound of the fee paid, in base units
    pub fn total_fee(&self) -> U256 {
        self.gas_limit.saturating_mul(self.max_fee_per_gas)
    }
}

/// A signed, broadcast-ready transaction. Lives only between signing and
/// broadcast.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub chain: Chain,
    /// Chain-native wire encoding
    pub raw: Vec<u8>,
    pub signature: Vec<u8>,
    /// Transaction hash / id in the chain's conventional text form
    pub hash: String,
}

impl SignedTransaction {
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

impl fmt::Debug for SignedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTransaction")
            .field("chain", &self.chain)
            .field("hash", &self.hash)
            .field("raw_len", &self.raw.len())
            .field("signature_len", &self.signature.len())
            .finish()
    }
}
