//! Solana signing: legacy messages carrying one System `Transfer`
//!
//! Wire form is `compact(sig count) ‖ signatures ‖ message`, where the
//! message is `header ‖ compact(keys) ‖ recent blockhash ‖
//! compact(instructions)`. The transaction id is the base58 fee-payer
//! signature.

use super::derivation::PrivateKey;
use super::signer::ChainBackend;
use crate::chain::Chain;
use crate::intent::{GasEstimate, SignedTransaction, TransactionIntent};
use crate::{Error, Result};
use ed25519_dalek::{Signer as _, SigningKey};

/// The System program id (`11111111111111111111111111111111`)
const SYSTEM_PROGRAM_ID: [u8; 32] = [0u8; 32];

/// System program instruction index of `Transfer`
const SYSTEM_TRANSFER: u32 = 2;

/// Backend for Solana mainnet
#[derive(Debug, Clone, Copy, Default)]
pub struct SolanaBackend;

impl SolanaBackend {
    fn decode_key(value: &str, what: &str) -> Result<[u8; 32]> {
        let bytes = bs58::decode(value)
            .into_vec()
            .map_err(|e| Error::InvalidArgument(format!("{} {}: {}", what, value, e)))?;
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
            Error::InvalidArgument(format!("{} {} is {} bytes, expected 32", what, value, bytes.len()))
        })
    }

    fn blockhash(intent: &TransactionIntent) -> Result<[u8; 32]> {
        let blockhash = intent.recent_blockhash().ok_or(Error::MissingBlockhash)?;
        Self::decode_key(blockhash, "blockhash")
    }
}

impl ChainBackend for SolanaBackend {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    fn address(&self, key: &PrivateKey) -> Result<String> {
        let signing_key = SigningKey::from_bytes(key.as_bytes());
        Ok(bs58::encode(signing_key.verifying_key().as_bytes()).into_string())
    }

    fn validate(&self, intent: &TransactionIntent) -> Result<()> {
        Self::blockhash(intent)?;
        Self::decode_key(&intent.to, "destination")?;
        u64::try_from(intent.value)
            .map_err(|_| Error::InvalidArgument("amount exceeds u64 lamports".to_string()))?;
        Ok(())
    }

    fn sign(
        &self,
        key: &PrivateKey,
        intent: &TransactionIntent,
        _gas: &GasEstimate,
    ) -> Result<SignedTransaction> {
        self.validate(intent)?;
        let signing_key = SigningKey::from_bytes(key.as_bytes());

        let message = transfer_message(
            signing_key.verifying_key().to_bytes(),
            Self::decode_key(&intent.to, "destination")?,
            Self::blockhash(intent)?,
            u64::try_from(intent.value)
                .map_err(|_| Error::InvalidArgument("amount exceeds u64 lamports".to_string()))?,
        );
        let signature = signing_key.sign(&message).to_bytes();

        let mut raw = Vec::with_capacity(1 + 64 + message.len());
        write_compact_u16(1, &mut raw);
        raw.extend_from_slice(&signature);
        raw.extend_from_slice(&message);

        let hash = bs58::encode(signature).into_string();
        tracing::debug!(signature = %hash, "Signed Solana transfer");

        Ok(SignedTransaction {
            chain: Chain::Solana,
            raw,
            signature: signature.to_vec(),
            hash,
        })
    }
}

/// Serialize a legacy message transferring `lamports` from `from` to `to`
fn transfer_message(from: [u8; 32], to: [u8; 32], blockhash: [u8; 32], lamports: u64) -> Vec<u8> {
    // Self-transfers list the payer once
    let mut keys = vec![from];
    if to != from {
        keys.push(to);
    }
    keys.push(SYSTEM_PROGRAM_ID);
    let to_index = if to == from { 0u8 } else { 1u8 };
    let program_index = (keys.len() - 1) as u8;

    let mut message = Vec::with_capacity(3 + 1 + 32 * keys.len() + 32 + 24);
    // header: 1 signer, 0 read-only signed, 1 read-only unsigned (the program)
    message.extend_from_slice(&[1, 0, 1]);
    write_compact_u16(keys.len() as u16, &mut message);
    for key in &keys {
        message.extend_from_slice(key);
    }
    message.extend_from_slice(&blockhash);

    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    write_compact_u16(1, &mut message);
    message.push(program_index);
    write_compact_u16(2, &mut message);
    message.extend_from_slice(&[0, to_index]);
    write_compact_u16(data.len() as u16, &mut message);
    message.extend_from_slice(&data);
    message
}

/// Solana "shortvec" length prefix: 7-bit groups, low first
fn write_compact_u16(mut value: u16, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{ChainData, TransferRequest};
    use crate::wallet::derivation::derive_private_key;
    use crate::wallet::derivation::tests::test_secret;
    use alloy::primitives::U256;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    const DESTINATION: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const BLOCKHASH: &str = "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N";

    fn intent(blockhash: Option<&str>) -> TransactionIntent {
        let mut request = TransferRequest::new(DESTINATION, U256::from(1_000_000u64));
        if let Some(hash) = blockhash {
            request = request.with_data(ChainData::RecentBlockhash(hash.to_string()));
        }
        TransactionIntent::new(Chain::Solana, "sender", &request)
    }

    #[test]
    fn compact_u16_matches_shortvec() {
        let encode = |v| {
            let mut out = Vec::new();
            write_compact_u16(v, &mut out);
            out
        };
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(0x7f), vec![0x7f]);
        assert_eq!(encode(0x80), vec![0x80, 0x01]);
        assert_eq!(encode(0x3fff), vec![0xff, 0x7f]);
        assert_eq!(encode(0xffff), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn missing_blockhash_fails_validation() {
        assert!(matches!(
            SolanaBackend.validate(&intent(None)),
            Err(Error::MissingBlockhash)
        ));
    }

    #[test]
    fn signature_verifies_over_message() {
        let key = derive_private_key(&test_secret(), Chain::Solana).unwrap();
        let gas = GasEstimate::flat(U256::from(1u64), U256::from(5_000u64));
        let signed = SolanaBackend.sign(&key, &intent(Some(BLOCKHASH)), &gas).unwrap();

        assert_eq!(signed.raw[0], 1);
        let signature = Signature::from_slice(&signed.raw[1..65]).unwrap();
        let message = &signed.raw[65..];

        let address = SolanaBackend.address(&key).unwrap();
        let public = SolanaBackend::decode_key(&address, "address").unwrap();
        let verifying_key = VerifyingKey::from_bytes(&public).unwrap();
        verifying_key.verify(message, &signature).unwrap();

        assert_eq!(signed.hash, bs58::encode(&signed.raw[1..65]).into_string());
        // header, 3 keys, fee payer first
        assert_eq!(&message[..4], &[1, 0, 1, 3]);
        assert_eq!(&message[4..36], &public);
    }

    #[test]
    fn transfer_instruction_encodes_lamports() {
        let message = transfer_message([1; 32], [2; 32], [3; 32], 1_000_000);
        let data = &message[message.len() - 12..];
        assert_eq!(&data[..4], &2u32.to_le_bytes());
        assert_eq!(&data[4..], &1_000_000u64.to_le_bytes());
    }

    #[test]
    fn self_transfer_lists_payer_once() {
        let message = transfer_message([1; 32], [1; 32], [3; 32], 5);
        assert_eq!(message[3], 2);
    }
}
