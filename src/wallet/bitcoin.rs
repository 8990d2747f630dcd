//! Bitcoin signing: native segwit (P2WPKH) spends
//!
//! Every caller-supplied UTXO is spent. Outputs are the payment plus change
//! back to the sender's own P2WPKH address when it clears the dust limit.

use super::derivation::{ErasingSecretKey, PrivateKey};
use super::signer::ChainBackend;
use crate::chain::Chain;
use crate::intent::{GasEstimate, SignedTransaction, TransactionIntent, Utxo};
use crate::{Error, Result};
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use std::str::FromStr;

/// Outputs below this many satoshis are not relayed
pub const DUST_LIMIT_SAT: u64 = 546;

/// Backend for Bitcoin mainnet
#[derive(Debug, Clone, Copy, Default)]
pub struct BitcoinBackend;

impl BitcoinBackend {
    const NETWORK: Network = Network::Bitcoin;

    fn parse_address(address: &str) -> Result<Address> {
        Address::from_str(address)
            .and_then(|a| a.require_network(Self::NETWORK))
            .map_err(|e| Error::InvalidArgument(format!("address {}: {}", address, e)))
    }

    fn utxos(intent: &TransactionIntent) -> Result<&[Utxo]> {
        match intent.utxos() {
            Some(utxos) if !utxos.is_empty() => Ok(utxos),
            _ => Err(Error::MissingInputs),
        }
    }
}

impl ChainBackend for BitcoinBackend {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    fn address(&self, key: &PrivateKey) -> Result<String> {
        let secp = Secp256k1::signing_only();
        let public_key = CompressedPublicKey(ErasingSecretKey::new(key)?.public_key(&secp));
        Ok(Address::p2wpkh(&public_key, Self::NETWORK).to_string())
    }

    fn validate(&self, intent: &TransactionIntent) -> Result<()> {
        let utxos = Self::utxos(intent)?;
        for utxo in utxos {
            Txid::from_str(&utxo.txid)
                .map_err(|e| Error::InvalidArgument(format!("utxo txid {}: {}", utxo.txid, e)))?;
        }
        Self::parse_address(&intent.to)?;
        u64::try_from(intent.value)
            .map_err(|_| Error::InvalidArgument("amount exceeds u64 satoshis".to_string()))?;
        Ok(())
    }

    fn sign(
        &self,
        key: &PrivateKey,
        intent: &TransactionIntent,
        gas: &GasEstimate,
    ) -> Result<SignedTransaction> {
        self.validate(intent)?;
        let utxos = Self::utxos(intent)?;

        let secp = Secp256k1::new();
        let secret_key = ErasingSecretKey::new(key)?;
        let public_key = CompressedPublicKey(secret_key.public_key(&secp));
        let own_script = Address::p2wpkh(&public_key, Self::NETWORK).script_pubkey();

        let value = u64::try_from(intent.value)
            .map_err(|_| Error::InvalidArgument("amount exceeds u64 satoshis".to_string()))?;
        let fee = u64::try_from(gas.total_fee())
            .map_err(|_| Error::InvalidArgument("fee exceeds u64 satoshis".to_string()))?;
        let total_in = utxos
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.value_sat))
            .ok_or_else(|| Error::InvalidArgument("input total overflows".to_string()))?;
        let change = total_in
            .checked_sub(value)
            .and_then(|rest| rest.checked_sub(fee))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "inputs of {} sat cannot cover {} sat plus {} sat fee",
                    total_in, value, fee
                ))
            })?;
        let kept_change = if change >= DUST_LIMIT_SAT { change } else { 0 };

        let mut output = vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: Self::parse_address(&intent.to)?.script_pubkey(),
        }];
        if kept_change > 0 {
            output.push(TxOut {
                value: Amount::from_sat(kept_change),
                script_pubkey: own_script.clone(),
            });
        }

        let input = utxos
            .iter()
            .map(|utxo| {
                let txid = Txid::from_str(&utxo.txid).map_err(|e| {
                    Error::InvalidArgument(format!("utxo txid {}: {}", utxo.txid, e))
                })?;
                Ok(TxIn {
                    previous_output: OutPoint::new(txid, utxo.vout),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input,
            output,
        };

        let mut witnesses = Vec::with_capacity(utxos.len());
        let mut first_signature = Vec::new();
        {
            let mut cache = SighashCache::new(&tx);
            for (index, utxo) in utxos.iter().enumerate() {
                let sighash = cache
                    .p2wpkh_signature_hash(
                        index,
                        &own_script,
                        Amount::from_sat(utxo.value_sat),
                        EcdsaSighashType::All,
                    )
                    .map_err(|e| Error::Signing(format!("sighash for input {}: {}", index, e)))?;
                let message = Message::from_digest(sighash.to_byte_array());
                let signature = bitcoin::ecdsa::Signature {
                    signature: secp.sign_ecdsa(&message, &secret_key),
                    sighash_type: EcdsaSighashType::All,
                };
                let encoded = signature.to_vec();
                if index == 0 {
                    first_signature = encoded.clone();
                }

                let mut witness = Witness::new();
                witness.push(encoded);
                witness.push(public_key.to_bytes());
                witnesses.push(witness);
            }
        }
        for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
            txin.witness = witness;
        }

        let txid = tx.compute_txid();
        tracing::debug!(
            inputs = tx.input.len(),
            outputs = tx.output.len(),
            fee_sat = total_in - value - kept_change,
            %txid,
            "Signed P2WPKH transaction"
        );

        Ok(SignedTransaction {
            chain: Chain::Bitcoin,
            raw: bitcoin::consensus::encode::serialize(&tx),
            signature: first_signature,
            hash: txid.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{ChainData, TransferRequest};
    use crate::wallet::derivation::derive_private_key;
    use crate::wallet::derivation::tests::test_secret;
    use alloy::primitives::U256;

    const OWN_ADDRESS: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
    const DESTINATION: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";

    fn intent(utxos: Option<Vec<Utxo>>) -> TransactionIntent {
        let mut request = TransferRequest::new(DESTINATION, U256::from(50_000u64));
        if let Some(utxos) = utxos {
            request = request.with_data(ChainData::Utxos(utxos));
        }
        TransactionIntent::new(Chain::Bitcoin, OWN_ADDRESS, &request)
    }

    fn utxo(value_sat: u64) -> Utxo {
        Utxo {
            txid: "5e2383defe7efcbdc9fdd6dba55da148b206617bbb49e6bb93fce7bfbb459d44".to_string(),
            vout: 1,
            value_sat,
        }
    }

    #[test]
    fn address_matches_bip84_vector() {
        let key = derive_private_key(&test_secret(), Chain::Bitcoin).unwrap();
        assert_eq!(BitcoinBackend.address(&key).unwrap(), OWN_ADDRESS);
    }

    #[test]
    fn missing_utxos_fail_validation() {
        assert!(matches!(
            BitcoinBackend.validate(&intent(None)),
            Err(Error::MissingInputs)
        ));
        assert!(matches!(
            BitcoinBackend.validate(&intent(Some(vec![]))),
            Err(Error::MissingInputs)
        ));
    }

    #[test]
    fn signs_payment_with_change() {
        let key = derive_private_key(&test_secret(), Chain::Bitcoin).unwrap();
        let gas = GasEstimate::flat(U256::from(141u64), U256::from(10u64));
        let signed = BitcoinBackend
            .sign(&key, &intent(Some(vec![utxo(100_000)])), &gas)
            .unwrap();

        let tx: Transaction = bitcoin::consensus::encode::deserialize(&signed.raw).unwrap();
        assert_eq!(tx.compute_txid().to_string(), signed.hash);
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].witness.len(), 2);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value, Amount::from_sat(50_000));
        assert_eq!(tx.output[1].value, Amount::from_sat(100_000 - 50_000 - 1_410));
        assert_eq!(
            tx.output[1].script_pubkey,
            BitcoinBackend::parse_address(OWN_ADDRESS).unwrap().script_pubkey()
        );
        assert_eq!(*signed.signature.last().unwrap(), EcdsaSighashType::All as u8);
    }

    #[test]
    fn dust_change_is_dropped() {
        let key = derive_private_key(&test_secret(), Chain::Bitcoin).unwrap();
        let gas = GasEstimate::flat(U256::from(110u64), U256::from(1u64));
        let signed = BitcoinBackend
            .sign(&key, &intent(Some(vec![utxo(50_300)])), &gas)
            .unwrap();
        let tx: Transaction = bitcoin::consensus::encode::deserialize(&signed.raw).unwrap();
        assert_eq!(tx.output.len(), 1);
    }

    #[test]
    fn insufficient_inputs_are_rejected() {
        let key = derive_private_key(&test_secret(), Chain::Bitcoin).unwrap();
        let gas = GasEstimate::flat(U256::from(110u64), U256::from(10u64));
        let result = BitcoinBackend.sign(&key, &intent(Some(vec![utxo(50_000)])), &gas);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn wrong_network_destination_is_rejected() {
        let request = TransferRequest::new("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx", U256::from(1u64))
            .with_data(ChainData::Utxos(vec![utxo(10_000)]));
        let intent = TransactionIntent::new(Chain::Bitcoin, OWN_ADDRESS, &request);
        assert!(matches!(
            BitcoinBackend.validate(&intent),
            Err(Error::InvalidArgument(_))
        ));
    }
}
