use base64::Engine;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::pre::{self, Capsule};
use crate::crypto::{signature_from_slice, EncryptingKey, PublicKey, SecretKey, Signature};
use crate::crypto::{DecryptingKey, VerifiedCapsuleFrag, SIGNATURE_SIZE};
use crate::error::ProtocolError;

/// An encrypted message as published by Enrico.
///
/// Encoded as `capsule(98) || signature(64) || ciphertext`. The signature is
/// Enrico's, over `capsule || ciphertext`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MessageKit {
    capsule: Capsule,
    ciphertext: Vec<u8>,
    signature: Signature,
}

fn signed_bytes(capsule: &Capsule, ciphertext: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(Capsule::serialized_size() + ciphertext.len());
    message.extend_from_slice(&capsule.to_bytes());
    message.extend_from_slice(ciphertext);
    message
}

/// Encrypt `plaintext` under a policy key and sign the result.
pub fn encrypt_message(
    plaintext: &[u8],
    policy_key: &EncryptingKey,
    signer: &SecretKey,
) -> Result<MessageKit, ProtocolError> {
    let (capsule, ciphertext) = pre::encrypt(policy_key, plaintext)?;
    let signature = signer.sign(&signed_bytes(&capsule, &ciphertext));
    Ok(MessageKit {
        capsule,
        ciphertext,
        signature,
    })
}

impl MessageKit {
    pub fn capsule(&self) -> &Capsule {
        &self.capsule
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Whether `data_source` produced this kit.
    pub fn verify(&self, data_source: &PublicKey) -> bool {
        data_source.is_valid_signature(
            &signed_bytes(&self.capsule, &self.ciphertext),
            &self.signature,
        )
    }

    /// Open the kit as Bob from `m` verified capsule fragments of the policy
    /// under `policy_key`, checking the data source first.
    pub fn decrypt_reencrypted(
        &self,
        data_source: &PublicKey,
        receiving: &DecryptingKey,
        policy_key: &EncryptingKey,
        cfrags: &[VerifiedCapsuleFrag],
    ) -> Result<Vec<u8>, ProtocolError> {
        if !self.verify(data_source) {
            return Err(ProtocolError::BadDataSource);
        }
        Ok(pre::decrypt_reencrypted(
            receiving,
            policy_key,
            &self.capsule,
            cfrags,
            &self.ciphertext,
        )?)
    }

    /// Open the kit with the secret of the key it was encrypted under.
    pub fn decrypt_original(
        &self,
        data_source: &PublicKey,
        key: &DecryptingKey,
    ) -> Result<Vec<u8>, ProtocolError> {
        if !self.verify(data_source) {
            return Err(ProtocolError::BadDataSource);
        }
        Ok(pre::decrypt_original(key, &self.capsule, &self.ciphertext)?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Capsule::serialized_size() + SIGNATURE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.capsule.to_bytes());
        out.extend_from_slice(&self.signature.to_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < Capsule::serialized_size() + SIGNATURE_SIZE {
            return Err(ProtocolError::MalformedInput(format!(
                "message kit too short: {} bytes",
                bytes.len()
            )));
        }
        let (capsule, rest) = bytes.split_at(Capsule::serialized_size());
        let (signature, ciphertext) = rest.split_at(SIGNATURE_SIZE);
        Ok(Self {
            capsule: Capsule::from_bytes(capsule)?,
            signature: signature_from_slice(signature)?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(encoded: &str) -> Result<Self, ProtocolError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProtocolError::MalformedInput(format!("message kit: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for MessageKit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for MessageKit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_encrypt_and_open_with_policy_secret() {
        let enrico = SecretKey::generate();
        let policy = DecryptingKey::generate();
        let kit = encrypt_message(b"hello", &policy.public(), &enrico).unwrap();

        assert!(kit.verify(&enrico.public()));
        assert_eq!(
            kit.decrypt_original(&enrico.public(), &policy).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_fresh_randomness_per_call() {
        let enrico = SecretKey::generate();
        let policy = DecryptingKey::generate().public();
        let a = encrypt_message(b"same", &policy, &enrico).unwrap();
        let b = encrypt_message(b"same", &policy, &enrico).unwrap();
        assert_ne!(a.capsule(), b.capsule());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn test_wrong_data_source_is_refused() {
        let enrico = SecretKey::generate();
        let policy = DecryptingKey::generate();
        let kit = encrypt_message(b"hello", &policy.public(), &enrico).unwrap();

        let impostor = SecretKey::generate().public();
        assert!(matches!(
            kit.decrypt_original(&impostor, &policy),
            Err(ProtocolError::BadDataSource)
        ));
    }

    #[test]
    fn test_tampered_kit_fails_signature() {
        let enrico = SecretKey::generate();
        let policy = DecryptingKey::generate();
        let kit = encrypt_message(b"hello", &policy.public(), &enrico).unwrap();

        let mut bytes = kit.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = MessageKit::from_bytes(&bytes).unwrap();
        assert!(!tampered.verify(&enrico.public()));
    }

    #[test]
    fn test_base64_encoding() {
        let enrico = SecretKey::generate();
        let kit = encrypt_message(b"hello", &DecryptingKey::generate().public(), &enrico).unwrap();
        assert_eq!(MessageKit::from_base64(&kit.to_base64()).unwrap(), kit);
        assert!(matches!(
            MessageKit::from_base64("not base64!"),
            Err(ProtocolError::MalformedInput(_))
        ));
        assert!(MessageKit::from_bytes(&[0u8; 10]).is_err());
    }
}
