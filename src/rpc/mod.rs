//! Chain JSON-RPC contract
//!
//! The pipeline depends only on [`ChainRpc`]: a request/response exchange of
//! `{method, params, id}` for `{result}` or `{error: {code, message}}`.
//! [`HttpRpcClient`] is the production transport; tests substitute scripted
//! doubles.

mod http;

pub use http::HttpRpcClient;

use crate::amount::{parse_json_decimal, parse_quantity};
use crate::chain::Chain;
use crate::intent::SignedTransaction;
use crate::{Error, Result};
use alloy::primitives::U256;
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

/// JSON-RPC method names used by the pipeline
pub mod methods {
    pub const ETH_GET_BALANCE: &str = "eth_getBalance";
    pub const ETH_GET_TRANSACTION_COUNT: &str = "eth_getTransactionCount";
    pub const ETH_GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
    pub const ETH_ESTIMATE_GAS: &str = "eth_estimateGas";
    pub const ETH_CALL: &str = "eth_call";
    pub const ETH_SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";

    pub const BTC_SCAN_TX_OUT_SET: &str = "scantxoutset";
    pub const BTC_SEND_RAW_TRANSACTION: &str = "sendrawtransaction";

    pub const SOL_GET_BALANCE: &str = "getBalance";
    pub const SOL_GET_LATEST_BLOCKHASH: &str = "getLatestBlockhash";
    pub const SOL_SEND_TRANSACTION: &str = "sendTransaction";
}

/// A JSON-RPC endpoint for one chain
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Execute one call and return its `result` member
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

/// Decode a JSON-RPC HTTP response.
///
/// A top-level `error` member is an RPC-level rejection whatever the HTTP
/// status; otherwise a non-2xx status is a transport failure.
pub fn decode_response(status: u16, body: &str) -> Result<Value> {
    let success = (200..300).contains(&status);

    let parsed: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if !success => return Err(Error::Network(format!("HTTP status {}", status))),
        Err(e) => return Err(Error::Parsing(format!("malformed JSON-RPC response: {}", e))),
    };

    let Value::Object(mut envelope) = parsed else {
        if !success {
            return Err(Error::Network(format!("HTTP status {}", status)));
        }
        return Err(Error::Parsing("JSON-RPC response is not an object".to_string()));
    };

    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(Error::Rpc { code, message });
    }

    if !success {
        return Err(Error::Network(format!("HTTP status {}", status)));
    }

    envelope
        .remove("result")
        .ok_or_else(|| Error::Parsing("response has neither result nor error".to_string()))
}

/// Native balance of `address` in base units
pub async fn fetch_balance(rpc: &dyn ChainRpc, chain: Chain, address: &str) -> Result<U256> {
    match chain {
        Chain::Ethereum => {
            let result = rpc
                .call(methods::ETH_GET_BALANCE, json!([address, "latest"]))
                .await?;
            parse_quantity(&result)
        }
        Chain::Bitcoin => {
            let descriptor = format!("addr({})", address);
            let result = rpc
                .call(methods::BTC_SCAN_TX_OUT_SET, json!(["start", [descriptor]]))
                .await?;
            let total = result
                .get("total_amount")
                .ok_or_else(|| Error::Parsing("scantxoutset result lacks total_amount".into()))?;
            parse_json_decimal(total, chain.decimals())
        }
        Chain::Solana => {
            let result = rpc
                .call(methods::SOL_GET_BALANCE, json!([address]))
                .await?;
            let value = result
                .get("value")
                .ok_or_else(|| Error::Parsing("getBalance result lacks value".into()))?;
            parse_quantity(value)
        }
    }
}

/// Next account nonce, counting pending transactions
pub async fn fetch_nonce(rpc: &dyn ChainRpc, address: &str) -> Result<u64> {
    let result = rpc
        .call(methods::ETH_GET_TRANSACTION_COUNT, json!([address, "pending"]))
        .await?;
    let nonce = parse_quantity(&result)?;
    u64::try_from(nonce).map_err(|_| Error::Parsing(format!("nonce {} exceeds u64", nonce)))
}

/// Base fee of the latest block
pub async fn fetch_base_fee(rpc: &dyn ChainRpc) -> Result<U256> {
    let block = rpc
        .call(methods::ETH_GET_BLOCK_BY_NUMBER, json!(["latest", false]))
        .await?;
    let base_fee = block
        .get("baseFeePerGas")
        .ok_or_else(|| Error::Parsing("latest block has no baseFeePerGas".into()))?;
    parse_quantity(base_fee)
}

/// A recent blockhash to anchor a Solana message
pub async fn fetch_recent_blockhash(rpc: &dyn ChainRpc) -> Result<String> {
    let result = rpc
        .call(methods::SOL_GET_LATEST_BLOCKHASH, json!([{"commitment": "finalized"}]))
        .await?;
    result
        .pointer("/value/blockhash")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Parsing("getLatestBlockhash result lacks blockhash".into()))
}

/// Submit a signed transaction and return the hash the node reports
pub async fn broadcast(rpc: &dyn ChainRpc, tx: &SignedTransaction) -> Result<String> {
    let result = match tx.chain {
        Chain::Ethereum => {
            rpc.call(methods::ETH_SEND_RAW_TRANSACTION, json!([tx.raw_hex()]))
                .await?
        }
        Chain::Bitcoin => {
            let raw = alloy::hex::encode(&tx.raw);
            rpc.call(methods::BTC_SEND_RAW_TRANSACTION, json!([raw]))
                .await?
        }
        Chain::Solana => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&tx.raw);
            rpc.call(
                methods::SOL_SEND_TRANSACTION,
                json!([encoded, {"encoding": "base64"}]),
            )
            .await?
        }
    };

    let hash = result
        .as_str()
        .ok_or_else(|| Error::Parsing(format!("broadcast returned non-string result {}", result)))?;
    if !hash.eq_ignore_ascii_case(&tx.hash) {
        tracing::warn!(
            chain = %tx.chain,
            local_hash = %tx.hash,
            node_hash = %hash,
            "Node reported a different transaction hash"
        );
    }
    Ok(hash.to_string())
}
