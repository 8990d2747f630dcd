//! Minimal big-endian integer encoding
//!
//! Integer fields of account-chain transactions are written big-endian with
//! leading zero bytes stripped. Zero is written as the single byte `0x00`,
//! never as an empty string.

use crate::{Error, Result};
use alloy::primitives::U256;

/// Encode `value` as minimal big-endian bytes
pub fn encode_uint(value: U256) -> Vec<u8> {
    let bytes = value.to_be_bytes::<32>();
    match bytes.iter().position(|b| *b != 0) {
        Some(first) => bytes[first..].to_vec(),
        None => vec![0x00],
    }
}

/// Decode minimal big-endian bytes, rejecting non-canonical forms
pub fn decode_uint(bytes: &[u8]) -> Result<U256> {
    match bytes {
        [] => Err(Error::Parsing("empty integer encoding".to_string())),
        [0x00] => Ok(U256::ZERO),
        [0x00, ..] => Err(Error::Parsing("integer encoding has leading zeros".to_string())),
        _ if bytes.len() > 32 => Err(Error::Parsing(format!(
            "integer encoding of {} bytes exceeds 256 bits",
            bytes.len()
        ))),
        _ => Ok(U256::from_be_slice(bytes)),
    }
}
