use super::powers::{CanEncrypt, CanSign};
use crate::crypto::{EncryptingKey, PublicKey, SecretKey};
use crate::error::ProtocolError;
use crate::policy::MessageKit;

/// A data source encrypting under one policy key.
#[derive(Debug, Clone)]
pub struct Enrico {
    signer: SecretKey,
    policy_key: EncryptingKey,
}

impl CanSign for Enrico {
    fn signing_key(&self) -> &SecretKey {
        &self.signer
    }
}

impl CanEncrypt for Enrico {}

impl Enrico {
    pub fn new(signer: SecretKey, policy_key: EncryptingKey) -> Self {
        Self { signer, policy_key }
    }

    /// A throwaway data source with a fresh signing key.
    pub fn ephemeral(policy_key: EncryptingKey) -> Self {
        Self::new(SecretKey::generate(), policy_key)
    }

    pub fn policy_key(&self) -> &EncryptingKey {
        &self.policy_key
    }

    /// Key Bob checks message kits from this source against.
    pub fn data_source(&self) -> PublicKey {
        self.stamp()
    }

    pub fn encrypt_message(&self, plaintext: &[u8]) -> Result<MessageKit, ProtocolError> {
        self.encrypt_for(&self.policy_key, plaintext)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::DecryptingKey;

    #[test]
    fn test_kits_are_signed_by_the_source() {
        let policy = DecryptingKey::generate();
        let enrico = Enrico::ephemeral(policy.public());
        let kit = enrico.encrypt_message(b"hello").unwrap();

        assert!(kit.verify(&enrico.data_source()));
        assert_eq!(
            kit.decrypt_original(&enrico.data_source(), &policy).unwrap(),
            b"hello"
        );
        // fresh capsule every time
        let again = enrico.encrypt_message(b"hello").unwrap();
        assert_ne!(kit.capsule(), again.capsule());
    }
}
