//! Threshold backup of the root secret
//!
//! Shamir secret sharing over GF(256) through `blahaj`: any `threshold` of
//! the `total` shares rebuild the secret, fewer reveal nothing about it.
//!
//! The shared payload is the secret followed by a 16-byte BLAKE3 tag of it,
//! so a reconstruction from a tampered or foreign share is detected instead
//! of producing a plausible wrong secret. Each share blob is laid out as
//!
//! ```text
//! version (1) | threshold (1) | index (1) | set id (16) | payload | checksum (4)
//! ```
//!
//! where the checksum is the first four bytes of BLAKE3 over everything
//! before it.

use crate::secret::SecretBytes;
use crate::{Error, Result};
use alloy::hex;
use blahaj::{Share, Sharks};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const SHARE_VERSION: u8 = 1;
const TAG_LEN: usize = 16;
const SET_ID_LEN: usize = 16;
const CHECKSUM_LEN: usize = 4;
const HEADER_LEN: usize = 3 + SET_ID_LEN;
/// Upper bound on T-subsets tried when more than T shares are supplied
const MAX_SUBSETS: usize = 4096;

/// One share of a split secret. Wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RecoveryShare {
    threshold: u8,
    index: u8,
    set_id: [u8; SET_ID_LEN],
    payload: Vec<u8>,
}

impl RecoveryShare {
    /// Evaluation point, 1..=N
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Identifier shared by every share of one split
    pub fn set_id(&self) -> uuid::Uuid {
        uuid::Uuid::from_bytes(self.set_id)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + CHECKSUM_LEN);
        out.push(SHARE_VERSION);
        out.push(self.threshold);
        out.push(self.index);
        out.extend_from_slice(&self.set_id);
        out.extend_from_slice(&self.payload);
        let checksum = blake3::hash(&out);
        out.extend_from_slice(&checksum.as_bytes()[..CHECKSUM_LEN]);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + TAG_LEN + 1 + CHECKSUM_LEN {
            return Err(Error::InvalidShares(format!(
                "share is too short ({} bytes)",
                bytes.len()
            )));
        }
        let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if blake3::hash(body).as_bytes()[..CHECKSUM_LEN] != *checksum {
            return Err(Error::InvalidShares("share checksum mismatch".to_string()));
        }
        if body[0] != SHARE_VERSION {
            return Err(Error::InvalidShares(format!(
                "unsupported share version {}",
                body[0]
            )));
        }

        let threshold = body[1];
        let index = body[2];
        if threshold == 0 || index == 0 {
            return Err(Error::InvalidShares(
                "share has a zero threshold or index".to_string(),
            ));
        }

        let mut set_id = [0u8; SET_ID_LEN];
        set_id.copy_from_slice(&body[3..HEADER_LEN]);
        Ok(Self {
            threshold,
            index,
            set_id,
            payload: body[HEADER_LEN..].to_vec(),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim())
                .map_err(|e| Error::InvalidShares(format!("share is not hex: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }
}

impl fmt::Debug for RecoveryShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryShare")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("set_id", &self.set_id())
            .field("payload", &"[REDACTED]")
            .finish()
    }
}

fn integrity_tag(secret: &[u8]) -> [u8; TAG_LEN] {
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&blake3::hash(secret).as_bytes()[..TAG_LEN]);
    tag
}

/// Split `secret` into `total` shares, any `threshold` of which rebuild it
pub fn generate_shares(secret: &[u8], total: usize, threshold: usize) -> Result<Vec<RecoveryShare>> {
    if threshold < 1 || threshold > total || total > u8::MAX as usize {
        return Err(Error::InvalidThreshold { threshold, total });
    }
    if secret.is_empty() {
        return Err(Error::InvalidArgument("cannot split an empty secret".to_string()));
    }

    let mut payload = Zeroizing::new(Vec::with_capacity(secret.len() + TAG_LEN));
    payload.extend_from_slice(secret);
    payload.extend_from_slice(&integrity_tag(secret));

    let set_id = *uuid::Uuid::new_v4().as_bytes();
    // blahaj share bytes are x (the index) followed by one y per payload byte
    let shares: Vec<RecoveryShare> = Sharks(threshold as u8)
        .dealer_rng(&payload, &mut OsRng)
        .take(total)
        .map(|share| {
            let bytes = Zeroizing::new(Vec::from(&share));
            RecoveryShare {
                threshold: threshold as u8,
                index: bytes[0],
                set_id,
                payload: bytes[1..].to_vec(),
            }
        })
        .collect();

    tracing::info!(total, threshold, set_id = %uuid::Uuid::from_bytes(set_id), "Secret split into shares");
    Ok(shares)
}

/// Rebuild the secret from at least `threshold` shares of one split.
///
/// Duplicates are ignored and order does not matter. With more than
/// `threshold` shares, subsets are tried until one passes the integrity
/// check, so a corrupted extra share does not prevent recovery.
pub fn reconstruct(shares: &[RecoveryShare]) -> Result<SecretBytes> {
    let first = shares
        .first()
        .ok_or_else(|| Error::InvalidShares("no shares supplied".to_string()))?;

    let mut distinct: Vec<&RecoveryShare> = Vec::with_capacity(shares.len());
    for share in shares {
        if share.set_id != first.set_id
            || share.threshold != first.threshold
            || share.payload.len() != first.payload.len()
        {
            return Err(Error::InvalidShares(
                "shares come from different splits".to_string(),
            ));
        }
        if share.index == 0 {
            return Err(Error::InvalidShares("share index 0 is invalid".to_string()));
        }
        match distinct.iter().find(|s| s.index == share.index) {
            Some(existing) if existing.payload != share.payload => {
                return Err(Error::InvalidShares(format!(
                    "conflicting shares for index {}",
                    share.index
                )));
            }
            Some(_) => {}
            None => distinct.push(share),
        }
    }

    let threshold = first.threshold as usize;
    if distinct.len() < threshold {
        return Err(Error::InvalidShares(format!(
            "need {} distinct shares, got {}",
            threshold,
            distinct.len()
        )));
    }
    if first.payload.len() <= TAG_LEN {
        return Err(Error::InvalidShares("share payload is too short".to_string()));
    }

    for (attempt, subset) in Combinations::new(distinct.len(), threshold).enumerate() {
        if attempt >= MAX_SUBSETS {
            break;
        }
        let chosen: Vec<&RecoveryShare> = subset.iter().map(|&i| distinct[i]).collect();
        if let Some(secret) = try_subset(&chosen) {
            tracing::info!(
                shares = distinct.len(),
                threshold,
                attempts = attempt + 1,
                "Secret reconstructed"
            );
            return Ok(secret);
        }
        tracing::debug!(?subset, "Share subset failed integrity check");
    }

    Err(Error::InvalidShares(
        "shares do not reconstruct a consistent secret".to_string(),
    ))
}

impl RecoveryShare {
    fn to_sharks(&self) -> Option<Share> {
        let mut bytes = Zeroizing::new(Vec::with_capacity(1 + self.payload.len()));
        bytes.push(self.index);
        bytes.extend_from_slice(&self.payload);
        Share::try_from(bytes.as_slice()).ok()
    }
}

fn try_subset(shares: &[&RecoveryShare]) -> Option<SecretBytes> {
    let threshold = shares[0].threshold;
    let sharks_shares = shares
        .iter()
        .map(|s| s.to_sharks())
        .collect::<Option<Vec<Share>>>()?;
    let payload = Zeroizing::new(Sharks(threshold).recover(&sharks_shares).ok()?);
    if payload.len() <= TAG_LEN {
        return None;
    }

    let (secret, tag) = payload.split_at(payload.len() - TAG_LEN);
    if integrity_tag(secret)[..] != *tag {
        return None;
    }
    Some(SecretBytes::from(secret.to_vec()))
}

/// Index subsets of size `k` from `0..n`, in lexicographic order
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n || k == 0,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();

        let k = self.indices.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] < self.n - k + i {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const SECRET: &[u8] = b"legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn recovered(shares: &[RecoveryShare]) -> Vec<u8> {
        reconstruct(shares).unwrap().expose_secret().to_vec()
    }

    #[test]
    fn every_threshold_subset_recovers_the_secret() {
        for (total, threshold) in [(1, 1), (3, 2), (4, 3), (5, 3), (5, 5)] {
            let shares = generate_shares(SECRET, total, threshold).unwrap();
            assert_eq!(shares.len(), total);

            for subset in Combinations::new(total, threshold) {
                let picked: Vec<RecoveryShare> =
                    subset.iter().map(|&i| shares[i].clone()).collect();
                assert_eq!(recovered(&picked), SECRET, "N={} T={} {:?}", total, threshold, subset);
            }
        }
    }

    #[test]
    fn order_and_duplicates_do_not_matter() {
        let shares = generate_shares(SECRET, 5, 3).unwrap();
        let picked = vec![
            shares[4].clone(),
            shares[1].clone(),
            shares[4].clone(),
            shares[2].clone(),
        ];
        assert_eq!(recovered(&picked), SECRET);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        for (total, threshold) in [(3, 4), (3, 0), (0, 0), (256, 2)] {
            assert!(matches!(
                generate_shares(SECRET, total, threshold),
                Err(Error::InvalidThreshold { .. })
            ));
        }
    }

    #[test]
    fn fewer_than_threshold_is_invalid_shares() {
        let shares = generate_shares(SECRET, 5, 3).unwrap();
        let err = reconstruct(&[shares[0].clone(), shares[3].clone()]).unwrap_err();
        assert!(matches!(err, Error::InvalidShares(msg) if msg.contains("need 3")));

        // a duplicate does not count twice
        let err = reconstruct(&[shares[0].clone(), shares[0].clone(), shares[3].clone()]);
        assert!(matches!(err, Err(Error::InvalidShares(_))));
        assert!(matches!(reconstruct(&[]), Err(Error::InvalidShares(_))));
    }

    #[test]
    fn corrupted_share_never_yields_the_secret() {
        let shares = generate_shares(SECRET, 3, 2).unwrap();
        let mut tampered = shares[1].clone();
        tampered.payload[0] ^= 0x01;

        // exactly T shares with one corrupted: detected
        let err = reconstruct(&[shares[0].clone(), tampered.clone()]).unwrap_err();
        assert!(matches!(err, Error::InvalidShares(_)));

        // an extra good share lets the search route around it
        assert_eq!(
            recovered(&[tampered, shares[0].clone(), shares[2].clone()]),
            SECRET
        );
    }

    #[test]
    fn blob_checksum_catches_bit_flips() {
        let shares = generate_shares(SECRET, 3, 2).unwrap();
        let mut bytes = shares[0].to_bytes();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x80;
        assert!(matches!(
            RecoveryShare::from_bytes(&bytes),
            Err(Error::InvalidShares(msg)) if msg.contains("checksum")
        ));
    }

    #[test]
    fn hex_blobs_survive_storage() {
        let shares = generate_shares(SECRET, 3, 2).unwrap();
        let stored: Vec<String> = shares.iter().map(RecoveryShare::to_hex).collect();

        let loaded: Vec<RecoveryShare> = stored[1..]
            .iter()
            .map(|s| RecoveryShare::from_hex(s).unwrap())
            .collect();
        assert_eq!(loaded[0].index(), 2);
        assert_eq!(loaded[0].threshold(), 2);
        assert_eq!(loaded[0].set_id(), shares[0].set_id());
        assert_eq!(recovered(&loaded), SECRET);
        assert!(RecoveryShare::from_hex("zz").is_err());
    }

    #[test]
    fn shares_from_different_splits_do_not_mix() {
        let a = generate_shares(SECRET, 3, 2).unwrap();
        let b = generate_shares(SECRET, 3, 2).unwrap();
        let err = reconstruct(&[a[0].clone(), b[1].clone()]).unwrap_err();
        assert!(matches!(err, Error::InvalidShares(msg) if msg.contains("different splits")));
    }

    #[test]
    fn payloads_are_plain_sharks_shares() {
        let shares = generate_shares(SECRET, 3, 2).unwrap();
        let indices: Vec<u8> = shares.iter().map(|s| s.index()).collect();
        assert_eq!(indices, vec![1, 2, 3]);

        let sharks_shares: Vec<Share> = shares[1..].iter().map(|s| s.to_sharks().unwrap()).collect();
        let payload = Sharks(2).recover(&sharks_shares).unwrap();
        assert_eq!(&payload[..SECRET.len()], SECRET);
        assert_eq!(payload[SECRET.len()..], integrity_tag(SECRET)[..]);
    }

    #[test]
    fn debug_output_hides_payload() {
        let shares = generate_shares(SECRET, 2, 2).unwrap();
        let debug = format!("{:?}", shares[0]);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("legal"));
    }
}
