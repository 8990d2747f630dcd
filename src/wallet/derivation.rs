//! HD key derivation
//!
//! BIP-39 mnemonic → 64-byte seed → child key along the chain's path:
//! BIP-32 secp256k1 for Ethereum and Bitcoin, SLIP-0010 ed25519 for Solana.
//! Seeds, SLIP-10 nodes and the returned key are zeroized on drop. The
//! secp256k1 master and child keys are erased by drop guards; levels
//! created inside `Xpriv::derive_priv` are not reachable from here.

use crate::chain::Chain;
use crate::secret::SecretBytes;
use crate::{Error, Result};
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::Network;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha512;
use std::ops::Deref;
use std::str::FromStr;
use zeroize::Zeroizing;

const HARDENED: u32 = 0x8000_0000;

/// A derived 32-byte private key, wiped on drop
pub struct PrivateKey(Zeroizing<[u8; 32]>);

impl PrivateKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// secp256k1 key erased on drop. `SecretKey` is `Copy` and never wipes itself.
pub(crate) struct ErasingSecretKey(SecretKey);

impl ErasingSecretKey {
    pub(crate) fn new(key: &PrivateKey) -> Result<Self> {
        SecretKey::from_slice(key.as_bytes())
            .map(Self)
            .map_err(|e| Error::Signing(format!("invalid secp256k1 key: {}", e)))
    }

    fn erase(&mut self) {
        self.0.non_secure_erase();
    }
}

impl Deref for ErasingSecretKey {
    type Target = SecretKey;

    fn deref(&self) -> &SecretKey {
        &self.0
    }
}

impl Drop for ErasingSecretKey {
    fn drop(&mut self) {
        self.erase();
    }
}

/// Extended key whose private half is erased on drop
struct ErasingXpriv(Xpriv);

impl ErasingXpriv {
    fn erase(&mut self) {
        self.0.private_key.non_secure_erase();
    }
}

impl Drop for ErasingXpriv {
    fn drop(&mut self) {
        self.erase();
    }
}

/// Derive the first-account private key for `chain` from a mnemonic secret
pub fn derive_private_key(secret: &SecretBytes, chain: Chain) -> Result<PrivateKey> {
    let seed = mnemonic_seed(secret)?;
    match chain {
        Chain::Ethereum | Chain::Bitcoin => derive_bip32(&seed[..], chain.derivation_path()),
        Chain::Solana => derive_slip10_ed25519(&seed[..], chain.derivation_path()),
    }
}

/// Check that `phrase` is a valid English BIP-39 mnemonic
pub fn validate_mnemonic(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

fn mnemonic_seed(secret: &SecretBytes) -> Result<Zeroizing<[u8; 64]>> {
    let phrase = std::str::from_utf8(secret.expose_secret())
        .map_err(|_| Error::Signing("root secret is not valid UTF-8".to_string()))?;
    // Mnemonic wipes its word indices on drop (bip39 `zeroize` feature)
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.trim())
        .map_err(|e| Error::Signing(format!("invalid mnemonic: {}", e)))?;
    Ok(Zeroizing::new(mnemonic.to_seed("")))
}

fn derive_bip32(seed: &[u8], path: &str) -> Result<PrivateKey> {
    let secp = Secp256k1::new();
    let path = DerivationPath::from_str(path)
        .map_err(|e| Error::Signing(format!("invalid derivation path {}: {}", path, e)))?;
    let master = Xpriv::new_master(Network::Bitcoin, seed)
        .map(ErasingXpriv)
        .map_err(|e| Error::Signing(format!("master key derivation failed: {}", e)))?;
    let child = master
        .0
        .derive_priv(&secp, &path)
        .map(ErasingXpriv)
        .map_err(|e| Error::Signing(format!("child key derivation failed: {}", e)))?;
    Ok(PrivateKey(Zeroizing::new(child.0.private_key.secret_bytes())))
}

/// SLIP-0010 ed25519 derivation (hardened levels only)
fn derive_slip10_ed25519(seed: &[u8], path: &str) -> Result<PrivateKey> {
    let indices = parse_hardened_path(path)?;

    let mut mac = Hmac::<Sha512>::new_from_slice(b"ed25519 seed")
        .map_err(|e| Error::Signing(e.to_string()))?;
    mac.update(seed);
    let mut node = Zeroizing::new([0u8; 64]);
    node.copy_from_slice(&mac.finalize().into_bytes());

    for index in indices {
        let mut mac = Hmac::<Sha512>::new_from_slice(&node[32..])
            .map_err(|e| Error::Signing(e.to_string()))?;
        mac.update(&[0x00]);
        mac.update(&node[..32]);
        mac.update(&index.to_be_bytes());
        node.copy_from_slice(&mac.finalize().into_bytes());
    }

    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&node[..32]);
    Ok(PrivateKey(key))
}

fn parse_hardened_path(path: &str) -> Result<Vec<u32>> {
    let rest = path
        .strip_prefix("m/")
        .ok_or_else(|| Error::Signing(format!("path {} must start with m/", path)))?;

    rest.split('/')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let number = part
                .strip_suffix('\'')
                .or_else(|| part.strip_suffix('h'))
                .ok_or_else(|| {
                    Error::Signing(format!("ed25519 path component {} must be hardened", part))
                })?;
            let index: u32 = number
                .parse()
                .map_err(|_| Error::Signing(format!("invalid path component {}", part)))?;
            if index >= HARDENED {
                return Err(Error::Signing(format!("path index {} out of range", index)));
            }
            Ok(index | HARDENED)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    pub(crate) fn test_secret() -> SecretBytes {
        SecretBytes::from(TEST_MNEMONIC.as_bytes().to_vec())
    }

    #[test]
    fn derivation_is_deterministic() {
        for chain in Chain::ALL {
            let a = derive_private_key(&test_secret(), chain).unwrap();
            let b = derive_private_key(&test_secret(), chain).unwrap();
            assert_eq!(a.as_bytes(), b.as_bytes());
        }
    }

    #[test]
    fn chains_get_distinct_keys() {
        let eth = derive_private_key(&test_secret(), Chain::Ethereum).unwrap();
        let btc = derive_private_key(&test_secret(), Chain::Bitcoin).unwrap();
        let sol = derive_private_key(&test_secret(), Chain::Solana).unwrap();
        assert_ne!(eth.as_bytes(), btc.as_bytes());
        assert_ne!(eth.as_bytes(), sol.as_bytes());
    }

    #[test]
    fn ethereum_key_matches_bip44_vector() {
        let key = derive_private_key(&test_secret(), Chain::Ethereum).unwrap();
        assert_eq!(
            alloy::hex::encode(key.as_bytes()),
            "1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727"
        );
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        let secret = SecretBytes::from(b"not a mnemonic phrase".to_vec());
        assert!(matches!(
            derive_private_key(&secret, Chain::Ethereum),
            Err(Error::Signing(_))
        ));
        assert!(!validate_mnemonic("abandon abandon"));
        assert!(validate_mnemonic(TEST_MNEMONIC));
    }

    #[test]
    fn slip10_requires_hardened_levels() {
        assert!(parse_hardened_path("m/44'/501'/0'/0").is_err());
        assert_eq!(
            parse_hardened_path("m/44'/501'").unwrap(),
            vec![44 | HARDENED, 501 | HARDENED]
        );
    }

    #[test]
    fn secp_guards_erase_key_material() {
        let key = derive_private_key(&test_secret(), Chain::Bitcoin).unwrap();

        let mut secret = ErasingSecretKey::new(&key).unwrap();
        assert_eq!(&secret.secret_bytes(), key.as_bytes());
        secret.erase();
        assert_ne!(&secret.secret_bytes(), key.as_bytes());

        let seed = mnemonic_seed(&test_secret()).unwrap();
        let mut master = ErasingXpriv(Xpriv::new_master(Network::Bitcoin, &seed[..]).unwrap());
        let original = master.0.private_key.secret_bytes();
        master.erase();
        assert_ne!(master.0.private_key.secret_bytes(), original);
    }

    #[test]
    fn debug_redacts_key() {
        let key = derive_private_key(&test_secret(), Chain::Ethereum).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("1ab42cc4"));
    }
}
