use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use umbral_pre::{DeserializableFromArray, SerializableToArray};

use super::PreError;
use crate::crypto::keys::KeyError;

/// Compressed secp256k1 point.
pub const ENCRYPTING_KEY_SIZE: usize = 33;
pub const DECRYPTING_KEY_SIZE: usize = 32;
pub const DELEGATING_SECRET_SIZE: usize = 32;

const DECRYPTING_KEY_PEM_TAG: &str = "DECRYPTING KEY";
const DELEGATING_SECRET_PEM_TAG: &str = "DELEGATING SECRET";
const POLICY_KEY_CONTEXT: &str = "trove 2025-01 policy decrypting key";

/// Public key anyone can encrypt to: Bob's key, or a policy key Enrico
/// publishes under. Kept in its compressed form; the curve point is
/// validated once, at construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncryptingKey([u8; ENCRYPTING_KEY_SIZE]);

impl std::fmt::Debug for EncryptingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptingKey({})", self.to_hex())
    }
}

impl std::fmt::Display for EncryptingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl EncryptingKey {
    pub(crate) fn from_umbral(key: &umbral_pre::PublicKey) -> Self {
        let mut bytes = [0u8; ENCRYPTING_KEY_SIZE];
        bytes.copy_from_slice(key.to_array().as_slice());
        Self(bytes)
    }

    pub(crate) fn to_umbral(self) -> Result<umbral_pre::PublicKey, PreError> {
        umbral_pre::PublicKey::from_bytes(self.0).map_err(|_| PreError::InvalidKey)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreError> {
        if bytes.len() != ENCRYPTING_KEY_SIZE {
            return Err(PreError::InvalidLength {
                expected: ENCRYPTING_KEY_SIZE,
                got: bytes.len(),
            });
        }
        let key = umbral_pre::PublicKey::from_bytes(bytes).map_err(|_| PreError::InvalidKey)?;
        Ok(Self::from_umbral(&key))
    }

    pub fn from_hex(hex: &str) -> Result<Self, PreError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|_| PreError::InvalidHex)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; ENCRYPTING_KEY_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for EncryptingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for EncryptingKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

/// Secret half of an [`EncryptingKey`].
///
/// Stored as the 32 byte scalar it was built from, which is also what the
/// PEM file holds.
#[derive(Clone)]
pub struct DecryptingKey {
    bytes: [u8; DECRYPTING_KEY_SIZE],
    inner: umbral_pre::SecretKey,
}

impl PartialEq for DecryptingKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for DecryptingKey {}

impl std::fmt::Debug for DecryptingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecryptingKey({})", self.public())
    }
}

impl DecryptingKey {
    pub fn generate() -> Self {
        loop {
            // a random 32 byte string is a valid scalar but for a 2^-128 chance
            if let Ok(key) = Self::from_bytes(&crate::crypto::random_bytes::<DECRYPTING_KEY_SIZE>()) {
                return key;
            }
        }
    }

    pub fn public(&self) -> EncryptingKey {
        EncryptingKey::from_umbral(&self.inner.public_key())
    }

    pub(crate) fn umbral(&self) -> &umbral_pre::SecretKey {
        &self.inner
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreError> {
        let bytes: [u8; DECRYPTING_KEY_SIZE] =
            bytes.try_into().map_err(|_| PreError::InvalidLength {
                expected: DECRYPTING_KEY_SIZE,
                got: bytes.len(),
            })?;
        let inner = umbral_pre::SecretKey::from_bytes(bytes).map_err(|_| PreError::InvalidKey)?;
        Ok(Self { bytes, inner })
    }

    pub fn to_bytes(&self) -> [u8; DECRYPTING_KEY_SIZE] {
        self.bytes
    }

    pub fn to_pem(&self) -> String {
        crate::crypto::encode_pem(DECRYPTING_KEY_PEM_TAG, &self.bytes)
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let bytes = crate::crypto::decode_pem::<DECRYPTING_KEY_SIZE>(DECRYPTING_KEY_PEM_TAG, pem_str)?;
        Self::from_bytes(&bytes).map_err(|e| KeyError::Pem(e.to_string()))
    }
}

/// Alice's master secret. Every label gets its own policy key pair derived
/// from it, so Alice can always re-derive a policy key without storing it.
#[derive(Clone, PartialEq, Eq)]
pub struct DelegatingSecret([u8; DELEGATING_SECRET_SIZE]);

impl std::fmt::Debug for DelegatingSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DelegatingSecret(..)")
    }
}

impl From<[u8; DELEGATING_SECRET_SIZE]> for DelegatingSecret {
    fn from(bytes: [u8; DELEGATING_SECRET_SIZE]) -> Self {
        Self(bytes)
    }
}

impl DelegatingSecret {
    pub fn generate() -> Self {
        Self(crate::crypto::random_bytes())
    }

    /// The decrypting key behind the policy for `label`.
    pub fn policy_key(&self, label: &[u8]) -> DecryptingKey {
        let mut counter = 0u32;
        loop {
            let mut hasher = blake3::Hasher::new_derive_key(POLICY_KEY_CONTEXT);
            hasher.update(&self.0);
            hasher.update(&(label.len() as u64).to_be_bytes());
            hasher.update(label);
            hasher.update(&counter.to_be_bytes());
            if let Ok(key) = DecryptingKey::from_bytes(hasher.finalize().as_bytes()) {
                return key;
            }
            counter += 1;
        }
    }

    pub fn to_pem(&self) -> String {
        crate::crypto::encode_pem(DELEGATING_SECRET_PEM_TAG, &self.0)
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        crate::crypto::decode_pem::<DELEGATING_SECRET_SIZE>(DELEGATING_SECRET_PEM_TAG, pem_str)
            .map(Self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encrypting_key_encodings() {
        let key = DecryptingKey::generate().public();
        assert_eq!(EncryptingKey::from_hex(&key.to_hex()).unwrap(), key);
        assert_eq!(key.to_hex().len(), 2 * ENCRYPTING_KEY_SIZE);
        assert!(matches!(
            EncryptingKey::from_hex("not hex"),
            Err(PreError::InvalidHex)
        ));
        assert!(matches!(
            EncryptingKey::from_bytes(&[0xFF; ENCRYPTING_KEY_SIZE]),
            Err(PreError::InvalidKey)
        ));
        assert!(matches!(
            EncryptingKey::from_bytes(&[2u8; 32]),
            Err(PreError::InvalidLength { .. })
        ));

        let encoded = bincode::serialize(&key).unwrap();
        let decoded: EncryptingKey = bincode::deserialize(&encoded).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_policy_keys_are_per_label() {
        let secret = DelegatingSecret::generate();
        let a = secret.policy_key(b"label-a").public();
        assert_eq!(a, secret.policy_key(b"label-a").public());
        assert_ne!(a, secret.policy_key(b"label-b").public());
        assert_ne!(a, DelegatingSecret::generate().policy_key(b"label-a").public());
    }

    #[test]
    fn test_pem_roundtrips() {
        let decrypting = DecryptingKey::generate();
        let recovered = DecryptingKey::from_pem(&decrypting.to_pem()).unwrap();
        assert_eq!(decrypting, recovered);
        assert_eq!(decrypting.public(), recovered.public());

        let delegating = DelegatingSecret::generate();
        let recovered = DelegatingSecret::from_pem(&delegating.to_pem()).unwrap();
        assert_eq!(delegating, recovered);

        assert!(DelegatingSecret::from_pem(&decrypting.to_pem()).is_err());
    }
}
