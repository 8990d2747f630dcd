//! Ethereum signing: EIP-1559 typed transactions
//!
//! Envelope: `0x02 ‖ rlp([chain_id, nonce, max_priority_fee_per_gas,
//! max_fee_per_gas, gas_limit, to, value, data, access_list, y_parity, r, s])`.
//! Integer fields use the minimal big-endian form from [`encode_uint`].

use super::derivation::PrivateKey;
use super::encoding::encode_uint;
use super::signer::ChainBackend;
use crate::chain::Chain;
use crate::intent::{ChainData, GasEstimate, SignedTransaction, TransactionIntent};
use crate::{Error, Result};
use alloy::primitives::{keccak256, Address, U256};
use alloy::rlp::{Encodable, Header};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use std::str::FromStr;

/// EIP-2718 type byte of dynamic-fee transactions
const EIP1559_TX_TYPE: u8 = 0x02;

/// Backend for EVM account chains
#[derive(Debug, Clone, Copy, Default)]
pub struct EvmBackend;

impl EvmBackend {
    fn local_signer(key: &PrivateKey) -> Result<PrivateKeySigner> {
        PrivateKeySigner::from_slice(key.as_bytes())
            .map_err(|e| Error::Signing(format!("invalid secp256k1 key: {}", e)))
    }

    fn parse_to(intent: &TransactionIntent) -> Result<Address> {
        Address::from_str(&intent.to)
            .map_err(|e| Error::InvalidArgument(format!("destination {}: {}", intent.to, e)))
    }
}

impl ChainBackend for EvmBackend {
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    fn address(&self, key: &PrivateKey) -> Result<String> {
        Ok(Self::local_signer(key)?.address().to_checksum(None))
    }

    fn validate(&self, intent: &TransactionIntent) -> Result<()> {
        Self::parse_to(intent)?;
        if intent.nonce.is_none() {
            return Err(Error::InvalidArgument("nonce is required".to_string()));
        }
        match &intent.data {
            None | Some(ChainData::Call(_)) => Ok(()),
            Some(_) => Err(Error::InvalidArgument(
                "only call data is valid for account chains".to_string(),
            )),
        }
    }

    fn sign(
        &self,
        key: &PrivateKey,
        intent: &TransactionIntent,
        gas: &GasEstimate,
    ) -> Result<SignedTransaction> {
        self.validate(intent)?;
        let fields = Eip1559Fields::new(intent, gas)?;

        let unsigned = fields.envelope(None);
        let sighash = keccak256(&unsigned);

        let signer = Self::local_signer(key)?;
        let signature = signer
            .sign_hash_sync(&sighash)
            .map_err(|e| Error::Signing(format!("secp256k1 signing failed: {}", e)))?;

        let raw = fields.envelope(Some((signature.v(), signature.r(), signature.s())));
        let hash = keccak256(&raw);

        tracing::debug!(nonce = fields.nonce, tx_hash = %hash, "Signed EIP-1559 transaction");

        Ok(SignedTransaction {
            chain: Chain::Ethereum,
            signature: signature.as_bytes().to_vec(),
            hash: format!("{:#x}", hash),
            raw,
        })
    }
}

struct Eip1559Fields<'a> {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: U256,
    max_fee_per_gas: U256,
    gas_limit: U256,
    to: Address,
    value: U256,
    data: &'a [u8],
}

impl<'a> Eip1559Fields<'a> {
    fn new(intent: &'a TransactionIntent, gas: &GasEstimate) -> Result<Self> {
        let chain_id = intent
            .chain
            .chain_id()
            .ok_or_else(|| Error::UnsupportedChain(intent.chain.to_string()))?;
        Ok(Self {
            chain_id,
            nonce: intent
                .nonce
                .ok_or_else(|| Error::InvalidArgument("nonce is required".to_string()))?,
            max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
            max_fee_per_gas: gas.max_fee_per_gas,
            gas_limit: gas.gas_limit,
            to: EvmBackend::parse_to(intent)?,
            value: intent.value,
            data: intent.call_data().map(|d| &d[..]).unwrap_or_default(),
        })
    }

    /// Typed envelope, unsigned when `signature` is `None`
    fn envelope(&self, signature: Option<(bool, U256, U256)>) -> Vec<u8> {
        let mut payload = Vec::new();
        encode_int(U256::from(self.chain_id), &mut payload);
        encode_int(U256::from(self.nonce), &mut payload);
        encode_int(self.max_priority_fee_per_gas, &mut payload);
        encode_int(self.max_fee_per_gas, &mut payload);
        encode_int(self.gas_limit, &mut payload);
        self.to.as_slice().encode(&mut payload);
        encode_int(self.value, &mut payload);
        self.data.encode(&mut payload);
        // empty access list
        Header {
            list: true,
            payload_length: 0,
        }
        .encode(&mut payload);

        if let Some((y_parity, r, s)) = signature {
            encode_int(U256::from(y_parity as u8), &mut payload);
            encode_int(r, &mut payload);
            encode_int(s, &mut payload);
        }

        let mut out = Vec::with_capacity(payload.len() + 4);
        out.push(EIP1559_TX_TYPE);
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&payload);
        out
    }
}

/// Writes `value` as a minimal big-endian byte string.
///
/// Zero becomes `0x00` rather than canonical RLP's empty string, so nodes
/// that validate RLP strictly reject a transaction with a zero nonce or value.
fn encode_int(value: U256, out: &mut Vec<u8>) {
    encode_uint(value).as_slice().encode(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::TransferRequest;
    use crate::wallet::derivation::derive_private_key;
    use crate::wallet::derivation::tests::test_secret;
    use alloy::primitives::{Bytes, Signature};

    fn gas() -> GasEstimate {
        GasEstimate {
            gas_limit: U256::from(21_000u64),
            max_fee_per_gas: U256::from(31_500_000_000u64),
            max_priority_fee_per_gas: U256::from(1_500_000_000u64),
        }
    }

    fn intent(nonce: Option<u64>) -> TransactionIntent {
        let request = TransferRequest::new(
            "0x000000000000000000000000000000000000dEaD",
            U256::from(1_000_000_000_000_000u64),
        );
        let mut intent = TransactionIntent::new(
            Chain::Ethereum,
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94",
            &request,
        );
        intent.nonce = nonce;
        intent
    }

    #[test]
    fn address_matches_bip44_vector() {
        let key = derive_private_key(&test_secret(), Chain::Ethereum).unwrap();
        assert_eq!(
            EvmBackend.address(&key).unwrap(),
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        );
    }

    #[test]
    fn signature_recovers_to_sender() {
        let key = derive_private_key(&test_secret(), Chain::Ethereum).unwrap();
        let intent = intent(Some(7));
        let signed = EvmBackend.sign(&key, &intent, &gas()).unwrap();

        assert_eq!(signed.raw[0], EIP1559_TX_TYPE);
        assert_eq!(signed.hash, format!("{:#x}", keccak256(&signed.raw)));

        let fields = Eip1559Fields::new(&intent, &gas()).unwrap();
        let sighash = keccak256(fields.envelope(None));
        let signature = Signature::try_from(signed.signature.as_slice()).unwrap();
        let recovered = signature.recover_address_from_prehash(&sighash).unwrap();
        assert_eq!(
            recovered.to_checksum(None),
            "0x9858EfFD232B4033E47d90003D41EC34EcaEda94"
        );
    }

    #[test]
    fn zero_fields_encode_as_single_zero_byte() {
        let request = TransferRequest::new("0x000000000000000000000000000000000000dEaD", U256::ZERO);
        let mut intent = TransactionIntent::new(Chain::Ethereum, "0xfrom", &request);
        intent.nonce = Some(0);
        let fields = Eip1559Fields::new(&intent, &gas()).unwrap();
        let unsigned = fields.envelope(None);

        // type byte, list header, chain id 1, nonce 0
        let header_len = unsigned.len() - 1 - fields_payload_len(&unsigned);
        let payload = &unsigned[1 + header_len..];
        assert_eq!(payload[0], 0x01);
        assert_eq!(payload[1], 0x00);
    }

    fn fields_payload_len(envelope: &[u8]) -> usize {
        let mut buf = &envelope[1..];
        Header::decode(&mut buf).unwrap().payload_length
    }

    #[test]
    fn missing_nonce_is_rejected() {
        assert!(matches!(
            EvmBackend.validate(&intent(None)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn invalid_destination_is_rejected() {
        let request = TransferRequest::new("not-an-address", U256::from(1u64));
        let mut intent = TransactionIntent::new(Chain::Ethereum, "0xfrom", &request);
        intent.nonce = Some(0);
        assert!(matches!(
            EvmBackend.validate(&intent),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn call_data_changes_the_hash() {
        let key = derive_private_key(&test_secret(), Chain::Ethereum).unwrap();
        let plain = EvmBackend.sign(&key, &intent(Some(1)), &gas()).unwrap();

        let mut with_data = intent(Some(1));
        with_data.data = Some(ChainData::Call(Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb])));
        let called = EvmBackend.sign(&key, &with_data, &gas()).unwrap();
        assert_ne!(plain.hash, called.hash);
    }
}
