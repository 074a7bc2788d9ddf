//! Treasure maps: the signed routing table of a policy
//!
//! A map tells Bob which Ursula holds which key fragment. Alice signs it and
//! encrypts it for Bob, so only Bob learns the policy's topology and he can
//! detect any tampering on the way.
//!
//! # Layout
//!
//! ```text
//! [ hrac: 16 ][ m: u8 ][ count: u8 ]
//! [ count x ( node id: 32 || kfrag id: 32 ) ]     sorted by node id, no repeats
//! [ expiration flag: u8 ][ expiration: u64 BE ]?  the u64 only when flag == 1
//! [ signature: 64 ]                               over every byte before it
//! ```

use std::collections::BTreeMap;

use base64::Engine;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use super::{Hrac, HRAC_SIZE};
use crate::crypto::pre::{self, Capsule, KFragId, PreError, KFRAG_ID_SIZE};
use crate::crypto::{signature_from_slice, PublicKey, SecretKey, Signature};
use crate::crypto::{DecryptingKey, EncryptingKey, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

const ENTRY_SIZE: usize = PUBLIC_KEY_SIZE + KFRAG_ID_SIZE;
const MAX_DESTINATIONS: usize = u8::MAX as usize;

#[derive(Debug, thiserror::Error)]
pub enum TreasureMapError {
    #[error("invalid threshold: m={m} for {n} destinations")]
    InvalidThreshold { m: usize, n: usize },
    #[error("too many destinations: {0}")]
    TooManyDestinations(usize),
    #[error("malformed treasure map: {0}")]
    Malformed(String),
    #[error("treasure map could not be decrypted: {0}")]
    Decrypt(String),
    #[error("treasure map signature does not match the publisher")]
    Verification,
    #[error("treasure map could not be encrypted: {0}")]
    Encrypt(#[from] PreError),
}

/// Decrypted, not yet verified treasure map.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TreasureMap {
    hrac: Hrac,
    threshold: u8,
    destinations: BTreeMap<PublicKey, KFragId>,
    expiration: Option<u64>,
    signature: Signature,
}

fn unsigned_bytes(
    hrac: &Hrac,
    threshold: u8,
    destinations: &BTreeMap<PublicKey, KFragId>,
    expiration: Option<u64>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HRAC_SIZE + 2 + destinations.len() * ENTRY_SIZE + 9);
    out.extend_from_slice(hrac.as_bytes());
    out.push(threshold);
    // bounded by MAX_DESTINATIONS at construction
    out.push(destinations.len() as u8);
    for (node, kfrag_id) in destinations {
        out.extend_from_slice(node.as_bytes());
        out.extend_from_slice(&kfrag_id.0);
    }
    match expiration {
        Some(expiration) => {
            out.push(1);
            out.extend_from_slice(&expiration.to_be_bytes());
        }
        None => out.push(0),
    }
    out
}

impl TreasureMap {
    /// Assemble and sign a map from accepted arrangements.
    pub fn build(
        hrac: Hrac,
        threshold: usize,
        destinations: impl IntoIterator<Item = (PublicKey, KFragId)>,
        expiration: Option<u64>,
        signer: &SecretKey,
    ) -> Result<Self, TreasureMapError> {
        let mut map = BTreeMap::new();
        for (node, kfrag_id) in destinations {
            if map.insert(node, kfrag_id).is_some() {
                return Err(TreasureMapError::Malformed(format!(
                    "node {node} appears twice"
                )));
            }
        }
        if map.len() > MAX_DESTINATIONS {
            return Err(TreasureMapError::TooManyDestinations(map.len()));
        }
        if threshold == 0 || threshold > map.len() {
            return Err(TreasureMapError::InvalidThreshold {
                m: threshold,
                n: map.len(),
            });
        }

        let threshold = threshold as u8;
        let signature = signer.sign(&unsigned_bytes(&hrac, threshold, &map, expiration));
        Ok(Self {
            hrac,
            threshold,
            destinations: map,
            expiration,
            signature,
        })
    }

    pub fn hrac(&self) -> &Hrac {
        &self.hrac
    }

    pub fn threshold(&self) -> usize {
        self.threshold as usize
    }

    pub fn destinations(&self) -> &BTreeMap<PublicKey, KFragId> {
        &self.destinations
    }

    pub fn expiration(&self) -> Option<u64> {
        self.expiration
    }

    /// Whether `publisher` signed exactly these contents.
    pub fn verify(&self, publisher: &PublicKey) -> bool {
        let message = unsigned_bytes(
            &self.hrac,
            self.threshold,
            &self.destinations,
            self.expiration,
        );
        publisher.is_valid_signature(&message, &self.signature)
    }

    pub fn into_verified(
        self,
        publisher: &PublicKey,
    ) -> Result<VerifiedTreasureMap, TreasureMapError> {
        if !self.verify(publisher) {
            return Err(TreasureMapError::Verification);
        }
        Ok(VerifiedTreasureMap {
            map: self,
            publisher: *publisher,
        })
    }

    pub fn encrypt(&self, bob: &EncryptingKey) -> Result<EncryptedTreasureMap, TreasureMapError> {
        let (capsule, ciphertext) = pre::encrypt(bob, &self.to_bytes())?;
        Ok(EncryptedTreasureMap {
            capsule,
            ciphertext,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = unsigned_bytes(
            &self.hrac,
            self.threshold,
            &self.destinations,
            self.expiration,
        );
        out.extend_from_slice(&self.signature.to_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreasureMapError> {
        let mut reader = MapReader { bytes, offset: 0 };

        let mut hrac = [0u8; HRAC_SIZE];
        hrac.copy_from_slice(reader.take(HRAC_SIZE)?);
        let threshold = reader.take(1)?[0];
        let count = reader.take(1)?[0] as usize;
        if threshold == 0 || threshold as usize > count {
            return Err(TreasureMapError::InvalidThreshold {
                m: threshold as usize,
                n: count,
            });
        }

        let mut destinations = BTreeMap::new();
        let mut previous: Option<PublicKey> = None;
        for _ in 0..count {
            let node = PublicKey::try_from(reader.take(PUBLIC_KEY_SIZE)?)
                .map_err(|e| TreasureMapError::Malformed(format!("node id: {e}")))?;
            if previous.is_some_and(|previous| previous >= node) {
                return Err(TreasureMapError::Malformed(
                    "destinations are not strictly ascending".into(),
                ));
            }
            let mut kfrag_id = [0u8; KFRAG_ID_SIZE];
            kfrag_id.copy_from_slice(reader.take(KFRAG_ID_SIZE)?);
            destinations.insert(node, KFragId(kfrag_id));
            previous = Some(node);
        }

        let expiration = match reader.take(1)?[0] {
            0 => None,
            1 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(reader.take(8)?);
                Some(u64::from_be_bytes(raw))
            }
            flag => {
                return Err(TreasureMapError::Malformed(format!(
                    "unknown expiration flag {flag}"
                )))
            }
        };

        let signature = signature_from_slice(reader.take(SIGNATURE_SIZE)?)
            .map_err(|e| TreasureMapError::Malformed(e.to_string()))?;
        if reader.offset != bytes.len() {
            return Err(TreasureMapError::Malformed(format!(
                "{} trailing bytes",
                bytes.len() - reader.offset
            )));
        }

        Ok(Self {
            hrac: Hrac::from_bytes(hrac),
            threshold,
            destinations,
            expiration,
            signature,
        })
    }
}

struct MapReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> MapReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], TreasureMapError> {
        let end = self.offset + len;
        if end > self.bytes.len() {
            return Err(TreasureMapError::Malformed(format!(
                "truncated at byte {}",
                self.offset
            )));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }
}

/// A map whose signature was checked against the publisher. The retrieval
/// coordinator only accepts these.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VerifiedTreasureMap {
    map: TreasureMap,
    publisher: PublicKey,
}

impl VerifiedTreasureMap {
    pub fn hrac(&self) -> &Hrac {
        self.map.hrac()
    }

    pub fn threshold(&self) -> usize {
        self.map.threshold()
    }

    pub fn destinations(&self) -> &BTreeMap<PublicKey, KFragId> {
        self.map.destinations()
    }

    pub fn expiration(&self) -> Option<u64> {
        self.map.expiration()
    }

    pub fn publisher(&self) -> &PublicKey {
        &self.publisher
    }
}

/// A treasure map as it travels: encrypted for Bob's encrypting key.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EncryptedTreasureMap {
    capsule: Capsule,
    ciphertext: Vec<u8>,
}

impl EncryptedTreasureMap {
    pub fn decrypt(&self, bob: &DecryptingKey) -> Result<TreasureMap, TreasureMapError> {
        let plaintext = pre::decrypt_original(bob, &self.capsule, &self.ciphertext)
            .map_err(|e| TreasureMapError::Decrypt(e.to_string()))?;
        TreasureMap::from_bytes(&plaintext)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Capsule::serialized_size() + self.ciphertext.len());
        out.extend_from_slice(&self.capsule.to_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreasureMapError> {
        if bytes.len() <= Capsule::serialized_size() {
            return Err(TreasureMapError::Malformed(format!(
                "encrypted map too short: {} bytes",
                bytes.len()
            )));
        }
        let (capsule, ciphertext) = bytes.split_at(Capsule::serialized_size());
        let capsule =
            Capsule::from_bytes(capsule).map_err(|e| TreasureMapError::Decrypt(e.to_string()))?;
        Ok(Self {
            capsule,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, TreasureMapError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| TreasureMapError::Malformed(format!("base64: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for EncryptedTreasureMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for EncryptedTreasureMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Fixture {
        alice: SecretKey,
        bob: DecryptingKey,
        map: TreasureMap,
    }

    fn fixture(count: usize, m: usize, expiration: Option<u64>) -> Fixture {
        let alice = SecretKey::generate();
        let bob = DecryptingKey::generate();
        let hrac = Hrac::derive(&alice.public(), &bob.public(), b"label");
        let destinations =
            (0..count).map(|_| (SecretKey::generate().public(), KFragId::generate()));
        let map = TreasureMap::build(hrac, m, destinations, expiration, &alice).unwrap();
        Fixture { alice, bob, map }
    }

    #[test]
    fn test_layout() {
        let f = fixture(3, 2, None);
        let bytes = f.map.to_bytes();
        assert_eq!(bytes.len(), HRAC_SIZE + 2 + 3 * ENTRY_SIZE + 1 + SIGNATURE_SIZE);
        assert_eq!(&bytes[..HRAC_SIZE], f.map.hrac().as_bytes());
        assert_eq!(bytes[HRAC_SIZE], 2);
        assert_eq!(bytes[HRAC_SIZE + 1], 3);

        let nodes: Vec<_> = f.map.destinations().keys().copied().collect();
        let mut sorted = nodes.clone();
        sorted.sort();
        assert_eq!(nodes, sorted);

        let with_expiration = fixture(1, 1, Some(1_900_000_000));
        let bytes = with_expiration.map.to_bytes();
        let flag_at = HRAC_SIZE + 2 + ENTRY_SIZE;
        assert_eq!(bytes[flag_at], 1);
        assert_eq!(
            &bytes[flag_at + 1..flag_at + 9],
            &1_900_000_000u64.to_be_bytes()
        );
    }

    #[test]
    fn test_encrypt_decrypt_verify() {
        let f = fixture(5, 3, Some(1_900_000_000));
        let encrypted = f.map.encrypt(&f.bob.public()).unwrap();
        let decrypted = encrypted.decrypt(&f.bob).unwrap();
        assert_eq!(decrypted, f.map);
        assert!(decrypted.verify(&f.alice.public()));

        let verified = decrypted.into_verified(&f.alice.public()).unwrap();
        assert_eq!(verified.threshold(), 3);
        assert_eq!(verified.destinations().len(), 5);
        assert_eq!(verified.expiration(), Some(1_900_000_000));

        let wire = EncryptedTreasureMap::from_base64(&encrypted.to_base64()).unwrap();
        assert_eq!(wire, encrypted);
    }

    #[test]
    fn test_only_bob_can_decrypt() {
        let f = fixture(2, 1, None);
        let encrypted = f.map.encrypt(&f.bob.public()).unwrap();
        assert!(matches!(
            encrypted.decrypt(&DecryptingKey::generate()),
            Err(TreasureMapError::Decrypt(_))
        ));
    }

    #[test]
    fn test_wrong_publisher_fails_verification() {
        let f = fixture(2, 2, None);
        let mallory = SecretKey::generate().public();
        assert!(!f.map.verify(&mallory));
        assert!(matches!(
            f.map.clone().into_verified(&mallory),
            Err(TreasureMapError::Verification)
        ));
    }

    #[test]
    fn test_every_single_byte_tamper_is_detected() {
        let f = fixture(3, 2, Some(1_900_000_000));
        let bytes = f.map.encrypt(&f.bob.public()).unwrap().to_bytes();

        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let verified = EncryptedTreasureMap::from_bytes(&tampered)
                .and_then(|encrypted| encrypted.decrypt(&f.bob))
                .map(|map| map.verify(&f.alice.public()));
            assert!(
                !matches!(verified, Ok(true)),
                "tamper at byte {i} went unnoticed"
            );
        }
    }

    #[test]
    fn test_tampered_plaintext_fails_verification() {
        let f = fixture(2, 1, None);
        let mut bytes = f.map.to_bytes();
        // flip a bit inside the first kfrag id
        bytes[HRAC_SIZE + 2 + PUBLIC_KEY_SIZE] ^= 0x80;
        let parsed = TreasureMap::from_bytes(&bytes).unwrap();
        assert!(!parsed.verify(&f.alice.public()));
    }

    #[test]
    fn test_build_rejects_bad_parameters() {
        let alice = SecretKey::generate();
        let hrac = Hrac::from_bytes([7u8; HRAC_SIZE]);
        let node = SecretKey::generate().public();

        let duplicate = [(node, KFragId::generate()), (node, KFragId::generate())];
        assert!(matches!(
            TreasureMap::build(hrac, 1, duplicate, None, &alice),
            Err(TreasureMapError::Malformed(_))
        ));

        let single = [(node, KFragId::generate())];
        assert!(matches!(
            TreasureMap::build(hrac, 2, single, None, &alice),
            Err(TreasureMapError::InvalidThreshold { m: 2, n: 1 })
        ));
    }

    #[test]
    fn test_decoder_rejects_noncanonical_input() {
        let f = fixture(2, 1, None);
        let bytes = f.map.to_bytes();

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(TreasureMap::from_bytes(&trailing).is_err());
        assert!(TreasureMap::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        // swap the two entries so they are no longer ascending
        let start = HRAC_SIZE + 2;
        let mut swapped = bytes.clone();
        swapped[start..start + ENTRY_SIZE].copy_from_slice(&bytes[start + ENTRY_SIZE..start + 2 * ENTRY_SIZE]);
        swapped[start + ENTRY_SIZE..start + 2 * ENTRY_SIZE].copy_from_slice(&bytes[start..start + ENTRY_SIZE]);
        assert!(matches!(
            TreasureMap::from_bytes(&swapped),
            Err(TreasureMapError::Malformed(_))
        ));
    }
}
