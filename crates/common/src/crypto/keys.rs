use std::ops::Deref;

use curve25519_dalek::edwards::CompressedEdwardsY;
use iroh::{PublicKey as PPublicKey, SecretKey as SSecretKey};
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

pub use ed25519_dalek::Signature;

/// Size of Ed25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of Ed25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of a detached Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

const SIGNING_KEY_PEM_TAG: &str = "PRIVATE KEY";

/// Errors that can occur while parsing or using signing keys
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid key length, expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("bytes are not a valid ed25519 public key")]
    InvalidPoint,
    #[error("invalid PEM: {0}")]
    Pem(String),
}

/// Public half of a character's signing identity.
///
/// Wraps Iroh's `PublicKey`, so the same value is both the key that verifies
/// a character's signatures (Alice's treasure maps, Enrico's message kits,
/// an Ursula's arrangement acknowledgments) and the node id an Ursula is
/// dialed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Copy)]
pub struct PublicKey(PPublicKey);

impl Deref for PublicKey {
    type Target = PPublicKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<PPublicKey> for PublicKey {
    fn from(key: PPublicKey) -> Self {
        PublicKey(key)
    }
}

impl From<PublicKey> for PPublicKey {
    fn from(key: PublicKey) -> Self {
        key.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(KeyError::InvalidLength {
                expected: PUBLIC_KEY_SIZE,
                got: bytes.len(),
            });
        }
        let mut buff = [0; PUBLIC_KEY_SIZE];
        buff.copy_from_slice(bytes);
        Self::from_bytes(&buff)
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self, KeyError> {
        PPublicKey::from_bytes(bytes)
            .map(PublicKey)
            .map_err(|_| KeyError::InvalidPoint)
    }

    /// Parse a public key from a hexadecimal string
    ///
    /// Accepts both plain hex and "0x"-prefixed hex strings.
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        if hex.len() != PUBLIC_KEY_SIZE * 2 {
            return Err(KeyError::InvalidLength {
                expected: PUBLIC_KEY_SIZE,
                got: hex.len() / 2,
            });
        }
        let mut buff = [0; PUBLIC_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| KeyError::InvalidHex)?;
        Self::from_bytes(&buff)
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Convert the Ed25519 point to X25519 (Montgomery form) for ECDH.
    ///
    /// Used by the sealed envelope that carries a key fragment to the
    /// Ursula owning this key.
    #[allow(clippy::wrong_self_convention)]
    pub(crate) fn to_x25519(&self) -> Result<X25519PublicKey, KeyError> {
        let edwards_point = CompressedEdwardsY::from_slice(&self.to_bytes())
            .map_err(|_| KeyError::InvalidPoint)?
            .decompress()
            .ok_or(KeyError::InvalidPoint)?;

        let montgomery_point = edwards_point.to_montgomery();
        Ok(X25519PublicKey::from(montgomery_point.to_bytes()))
    }

    /// Verify a detached Ed25519 signature on a message.
    pub fn verify(
        &self,
        msg: &[u8],
        signature: &Signature,
    ) -> Result<(), ed25519_dalek::SignatureError> {
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&self.to_bytes())?;
        verifying_key.verify_strict(msg, signature)
    }

    /// Boolean form of [`PublicKey::verify`].
    pub fn is_valid_signature(&self, msg: &[u8], signature: &Signature) -> bool {
        self.verify(msg, signature).is_ok()
    }
}

/// Parse a detached signature from raw bytes.
pub fn signature_from_slice(bytes: &[u8]) -> Result<Signature, KeyError> {
    Signature::from_slice(bytes).map_err(|_| KeyError::InvalidLength {
        expected: SIGNATURE_SIZE,
        got: bytes.len(),
    })
}

/// Private half of a character's signing identity.
///
/// Never leaves the node. The daemon keeps it in `key.pem` inside the
/// node directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretKey(pub SSecretKey);

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(SSecretKey::from_bytes(&secret))
    }
}

impl Deref for SecretKey {
    type Target = SSecretKey;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl SecretKey {
    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; PRIVATE_KEY_SIZE];
        hex::decode_to_slice(hex, &mut buff).map_err(|_| KeyError::InvalidHex)?;
        Ok(Self::from(buff))
    }

    /// Generate a new random secret key using a cryptographically secure RNG
    pub fn generate() -> Self {
        Self::from(super::random_bytes::<PRIVATE_KEY_SIZE>())
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.public())
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn to_pem(&self) -> String {
        super::encode_pem(SIGNING_KEY_PEM_TAG, &self.to_bytes())
    }

    pub fn from_pem(pem_str: &str) -> Result<Self, KeyError> {
        let bytes = super::decode_pem::<PRIVATE_KEY_SIZE>(SIGNING_KEY_PEM_TAG, pem_str)?;
        Ok(Self::from(bytes))
    }

    /// The Ed25519 scalar reused as an X25519 static secret.
    pub(crate) fn to_x25519(&self) -> StaticSecret {
        let signing_key = self.0.secret();
        StaticSecret::from(signing_key.to_scalar_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        // iroh pins its own ed25519_dalek; both share the 64 byte encoding
        let sig = self.0.sign(msg);
        Signature::from_bytes(&sig.to_bytes())
    }
}
