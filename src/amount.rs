//! Precise amount handling
//!
//! Amounts travel as integer base units (`U256`) and are only turned into
//! decimal strings for display. Floating point is never used for money.

use crate::chain::Chain;
use crate::{Error, Result};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A displayable balance in a chain's native currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Plain decimal string in display units (never scientific notation)
    pub amount: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Balance {
    pub fn from_base_units(value: U256, chain: Chain) -> Self {
        Self {
            amount: format_units(value, chain.decimals()),
            symbol: chain.symbol().to_string(),
            decimals: chain.decimals(),
        }
    }
}

/// Format a U256 value with decimals
pub fn format_units(value: U256, decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!(
            "{:0>width$}",
            remainder.to_string(),
            width = decimals as usize
        );
        let trimmed = remainder_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}

/// Parse a decimal display amount ("1.25") into base units
pub fn parse_units(input: &str, decimals: u8) -> Result<U256> {
    let input = input.trim();
    let (whole, fraction) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(Error::Parsing(format!("not a decimal amount: {:?}", input)));
    }
    if fraction.len() > decimals as usize {
        return Err(Error::Parsing(format!(
            "amount {} has more than {} decimal places",
            input, decimals
        )));
    }

    let scale = U256::from(10).pow(U256::from(decimals));
    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10)
            .map_err(|e| Error::Parsing(format!("amount {}: {}", input, e)))?
    };
    let padded = format!("{:0<width$}", fraction, width = decimals as usize);
    let fraction = if padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&padded, 10)
            .map_err(|e| Error::Parsing(format!("amount {}: {}", input, e)))?
    };

    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(|| Error::Parsing(format!("amount {} overflows 256 bits", input)))
}

/// Parse a JSON-RPC quantity: a `0x` hex string, a decimal string or an
/// unsigned JSON integer. Anything else is a parsing error, never zero.
pub fn parse_quantity(value: &Value) -> Result<U256> {
    match value {
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                if hex.is_empty() {
                    return Err(Error::Parsing("empty hex quantity".to_string()));
                }
                U256::from_str_radix(hex, 16)
                    .map_err(|e| Error::Parsing(format!("hex quantity {}: {}", s, e)))
            } else if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                U256::from_str_radix(s, 10)
                    .map_err(|e| Error::Parsing(format!("quantity {}: {}", s, e)))
            } else {
                Err(Error::Parsing(format!("not a quantity: {:?}", s)))
            }
        }
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| Error::Parsing(format!("not an unsigned integer: {}", n))),
        other => Err(Error::Parsing(format!("expected quantity, got {}", other))),
    }
}

/// Convert a JSON number holding a display amount (as Bitcoin Core reports
/// BTC values) into base units without going through `f64` arithmetic.
pub fn parse_json_decimal(value: &Value, decimals: u8) -> Result<U256> {
    let Value::Number(n) = value else {
        return Err(Error::Parsing(format!("expected decimal amount, got {}", value)));
    };
    parse_units(&expand_exponent(&n.to_string())?, decimals)
}

/// Rewrite `1.5e-7` style notation as a plain decimal string
fn expand_exponent(repr: &str) -> Result<String> {
    let Some((mantissa, exponent)) = repr.split_once(|c| c == 'e' || c == 'E') else {
        return Ok(repr.to_string());
    };
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| Error::Parsing(format!("bad exponent in {}", repr)))?;
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{}{}", whole, fraction);
    let point = whole.len() as i32 + exponent;

    let expanded = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else if point as usize >= digits.len() {
        format!("{}{}", digits, "0".repeat(point as usize - digits.len()))
    } else {
        let (w, f) = digits.split_at(point as usize);
        format!("{}.{}", w, f)
    };
    Ok(expanded)
}

/// Signed decimal string for a balance delta in base units
pub fn signed_delta(magnitude: U256, negative: bool) -> String {
    if negative && !magnitude.is_zero() {
        format!("-{}", magnitude)
    } else {
        magnitude.to_string()
    }
}

/// Serde adapter writing `U256` as a plain decimal string
pub mod decimal_u256 {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10).map_err(serde::de::Error::custom)
    }
}
