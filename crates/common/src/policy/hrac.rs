use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptingKey, PublicKey};
use crate::error::ProtocolError;

pub const HRAC_SIZE: usize = 16;

const HRAC_CONTEXT: &str = "trove 2025-01 hashed resource access code";

/// Hashed Resource Access Code: the public handle of one policy, computed
/// from Alice's signing key, Bob's encrypting key and the label.
///
/// Ursulas key stored fragments and treasure maps by it, so Bob can find a
/// policy knowing only who granted it and under which label.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hrac([u8; HRAC_SIZE]);

impl Hrac {
    pub fn derive(alice: &PublicKey, bob: &EncryptingKey, label: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(HRAC_CONTEXT);
        hasher.update(alice.as_bytes());
        hasher.update(&bob.to_bytes());
        hasher.update(label);
        let mut out = [0u8; HRAC_SIZE];
        out.copy_from_slice(&hasher.finalize().as_bytes()[..HRAC_SIZE]);
        Self(out)
    }

    /// Same as [`Hrac::derive`] from raw key bytes, validating both keys.
    pub fn derive_from_bytes(
        alice: &[u8],
        bob: &[u8],
        label: &[u8],
    ) -> Result<Self, ProtocolError> {
        let alice = PublicKey::try_from(alice)?;
        let bob = EncryptingKey::from_bytes(bob)?;
        Ok(Self::derive(&alice, &bob, label))
    }

    pub fn from_bytes(bytes: [u8; HRAC_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HRAC_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Debug for Hrac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hrac({})", self.to_hex())
    }
}

impl std::fmt::Display for Hrac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{DecryptingKey, SecretKey};

    #[test]
    fn test_hrac_is_deterministic_and_input_sensitive() {
        let alice = SecretKey::generate().public();
        let bob = DecryptingKey::generate().public();
        let hrac = Hrac::derive(&alice, &bob, b"test");

        assert_eq!(hrac, Hrac::derive(&alice, &bob, b"test"));
        assert_ne!(hrac, Hrac::derive(&alice, &bob, b"test2"));
        assert_ne!(
            hrac,
            Hrac::derive(&SecretKey::generate().public(), &bob, b"test")
        );
        assert_ne!(
            hrac,
            Hrac::derive(&alice, &DecryptingKey::generate().public(), b"test")
        );
    }

    #[test]
    fn test_derive_from_bytes() {
        let alice = SecretKey::generate().public();
        let bob = DecryptingKey::generate().public();
        let hrac =
            Hrac::derive_from_bytes(alice.as_bytes(), &bob.to_bytes(), b"label").unwrap();
        assert_eq!(hrac, Hrac::derive(&alice, &bob, b"label"));

        let err = Hrac::derive_from_bytes(&alice.as_bytes()[..31], &bob.to_bytes(), b"label")
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidKeyMaterial(_)));
        let err = Hrac::derive_from_bytes(alice.as_bytes(), &[0xFF; 32], b"label").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidKeyMaterial(_)));
    }
}
