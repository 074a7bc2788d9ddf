use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use umbral_pre::{DeserializableFromArray, SerializableToArray, Signer};

use super::keys::{DecryptingKey, EncryptingKey};
use super::PreError;

pub const KFRAG_ID_SIZE: usize = 32;
/// Upper bound on `n`; treasure maps count destinations in one byte.
pub const MAX_SHARES: usize = 255;

const KFRAG_ID_CONTEXT: &str = "trove 2025-01 key fragment id";

/// Identifier of a key fragment: a hash of its encoding. Doubles as the
/// fragment handle in a treasure map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KFragId(pub [u8; KFRAG_ID_SIZE]);

impl KFragId {
    fn of(encoded: &[u8]) -> Self {
        Self(blake3::derive_key(KFRAG_ID_CONTEXT, encoded))
    }

    #[cfg(test)]
    pub(crate) fn generate() -> Self {
        Self(crate::crypto::random_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for KFragId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KFragId({})", &self.to_hex()[..12])
    }
}

impl std::fmt::Display for KFragId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// One share of a re-encryption key, as it travels to an Ursula. Nothing
/// can be done with it until [`KeyFrag::verify`] checks it against the
/// policy it claims to belong to.
#[derive(Clone)]
pub struct KeyFrag {
    id: KFragId,
    inner: umbral_pre::KeyFrag,
}

/// A key fragment checked against its signer, delegating key and receiving
/// key. Only these can re-encrypt.
#[derive(Clone)]
pub struct VerifiedKeyFrag {
    id: KFragId,
    inner: umbral_pre::VerifiedKeyFrag,
}

impl std::fmt::Debug for KeyFrag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFrag").field("id", &self.id).finish()
    }
}

impl std::fmt::Debug for VerifiedKeyFrag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedKeyFrag")
            .field("id", &self.id)
            .finish()
    }
}

impl PartialEq for KeyFrag {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for KeyFrag {}

/// Split the re-encryption key from `delegating` to `receiving` into
/// `shares` fragments, any `threshold` of which are needed to re-encrypt.
/// Every fragment is signed by `signer` and commits to both public keys.
pub fn generate_kfrags(
    delegating: &DecryptingKey,
    receiving: &EncryptingKey,
    signer: &DecryptingKey,
    threshold: usize,
    shares: usize,
) -> Result<Vec<VerifiedKeyFrag>, PreError> {
    if threshold == 0 || threshold > shares || shares > MAX_SHARES {
        return Err(PreError::InvalidThreshold { threshold, shares });
    }

    let signer = Signer::new(signer.umbral().clone());
    let kfrags = umbral_pre::generate_kfrags(
        delegating.umbral(),
        &receiving.to_umbral()?,
        &signer,
        threshold,
        shares,
        true,
        true,
    );

    Ok(kfrags
        .iter()
        .map(|kfrag| VerifiedKeyFrag {
            id: KFragId::of(kfrag.to_array().as_slice()),
            inner: kfrag.clone(),
        })
        .collect())
}

impl VerifiedKeyFrag {
    pub fn id(&self) -> KFragId {
        self.id
    }

    pub(crate) fn umbral(&self) -> &umbral_pre::VerifiedKeyFrag {
        &self.inner
    }

    /// Drop the verification mark to send the fragment on.
    pub fn unverify(&self) -> KeyFrag {
        KeyFrag {
            id: self.id,
            inner: self.inner.clone().unverify(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_array().to_vec()
    }
}

impl KeyFrag {
    pub fn id(&self) -> KFragId {
        self.id
    }

    /// Check the fragment was signed by `verifying_key` for this pair of
    /// delegating and receiving keys.
    pub fn verify(
        &self,
        verifying_key: &EncryptingKey,
        delegating: &EncryptingKey,
        receiving: &EncryptingKey,
    ) -> Result<VerifiedKeyFrag, PreError> {
        let delegating = delegating.to_umbral()?;
        let receiving = receiving.to_umbral()?;
        let inner = self
            .inner
            .clone()
            .verify(
                &verifying_key.to_umbral()?,
                Some(&delegating),
                Some(&receiving),
            )
            .map_err(|_| PreError::InvalidKeyFrag)?;
        Ok(VerifiedKeyFrag { id: self.id, inner })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_array().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreError> {
        let inner = umbral_pre::KeyFrag::from_bytes(bytes)
            .map_err(|e| PreError::Malformed(format!("key fragment: {e:?}")))?;
        Ok(KeyFrag {
            id: KFragId::of(bytes),
            inner,
        })
    }
}

impl Serialize for KeyFrag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for KeyFrag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn setup() -> (DecryptingKey, EncryptingKey) {
        (DecryptingKey::generate(), DecryptingKey::generate().public())
    }

    #[test]
    fn test_threshold_bounds() {
        let (delegating, receiving) = setup();
        for (m, n) in [(0, 3), (4, 3), (1, MAX_SHARES + 1)] {
            assert!(matches!(
                generate_kfrags(&delegating, &receiving, &delegating, m, n),
                Err(PreError::InvalidThreshold { .. })
            ));
        }
        let kfrags = generate_kfrags(&delegating, &receiving, &delegating, 2, 3).unwrap();
        assert_eq!(kfrags.len(), 3);
    }

    #[test]
    fn test_ids_are_distinct_and_follow_the_encoding() {
        let (delegating, receiving) = setup();
        let kfrags = generate_kfrags(&delegating, &receiving, &delegating, 2, 4).unwrap();
        for (i, kfrag) in kfrags.iter().enumerate() {
            assert!(kfrags[..i].iter().all(|other| other.id() != kfrag.id()));
            let parsed = KeyFrag::from_bytes(&kfrag.to_bytes()).unwrap();
            assert_eq!(parsed.id(), kfrag.id());
        }
    }

    #[test]
    fn test_kfrags_verify_against_their_keys_only() {
        let (delegating, receiving) = setup();
        let policy_key = delegating.public();
        let kfrags = generate_kfrags(&delegating, &receiving, &delegating, 2, 3).unwrap();

        for kfrag in &kfrags {
            let verified = kfrag
                .unverify()
                .verify(&policy_key, &policy_key, &receiving)
                .unwrap();
            assert_eq!(verified.id(), kfrag.id());
        }

        let sent = kfrags[0].unverify();
        let stranger = DecryptingKey::generate().public();
        assert!(matches!(
            sent.verify(&stranger, &policy_key, &receiving),
            Err(PreError::InvalidKeyFrag)
        ));
        assert!(sent.verify(&policy_key, &stranger, &receiving).is_err());
        assert!(sent.verify(&policy_key, &policy_key, &stranger).is_err());
    }

    #[test]
    fn test_kfrag_encoding() {
        let (delegating, receiving) = setup();
        let kfrag = generate_kfrags(&delegating, &receiving, &delegating, 1, 1)
            .unwrap()
            .remove(0)
            .unverify();
        let bytes = kfrag.to_bytes();
        assert_eq!(KeyFrag::from_bytes(&bytes).unwrap(), kfrag);
        assert!(matches!(
            KeyFrag::from_bytes(&bytes[1..]),
            Err(PreError::Malformed(_))
        ));

        let encoded = bincode::serialize(&kfrag).unwrap();
        assert_eq!(bincode::deserialize::<KeyFrag>(&encoded).unwrap(), kfrag);
    }

    #[test]
    fn test_tampered_fragment_never_verifies() {
        let (delegating, receiving) = setup();
        let policy_key = delegating.public();
        let bytes = generate_kfrags(&delegating, &receiving, &delegating, 1, 2)
            .unwrap()
            .remove(0)
            .to_bytes();

        for i in [0, bytes.len() / 2, bytes.len() - 1] {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let verified = KeyFrag::from_bytes(&tampered)
                .and_then(|kfrag| kfrag.verify(&policy_key, &policy_key, &receiving));
            assert!(verified.is_err(), "tamper at byte {i} went unnoticed");
        }
    }
}
