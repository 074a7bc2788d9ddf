use crate::crypto::{CapsuleFrag, DecryptingKey, EncryptingKey, PublicKey, SecretKey};
use crate::error::ProtocolError;
use crate::peer::ReencryptionRequest;
use crate::policy::{encrypt_message, MessageKit};

/// Holds an identity key and signs with it.
pub trait CanSign {
    fn signing_key(&self) -> &SecretKey;

    fn stamp(&self) -> PublicKey {
        self.signing_key().public()
    }
}

/// Produces signed message kits for a policy key.
pub trait CanEncrypt: CanSign {
    fn encrypt_for(
        &self,
        policy_key: &EncryptingKey,
        plaintext: &[u8],
    ) -> Result<MessageKit, ProtocolError> {
        encrypt_message(plaintext, policy_key, self.signing_key())
    }
}

/// Holds a PRE secret key.
pub trait CanDecrypt {
    fn decrypting_key(&self) -> &DecryptingKey;

    fn encrypting_key(&self) -> EncryptingKey {
        self.decrypting_key().public()
    }
}

/// Transforms capsules with the key fragments it holds.
pub trait CanReencrypt: CanSign {
    fn reencrypt(&self, request: &ReencryptionRequest) -> Result<CapsuleFrag, Refusal>;
}

/// Why an Ursula would not do what was asked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("no arrangement for this policy and fragment")]
    UnknownArrangement,
    #[error("policy expired")]
    Expired,
    #[error("not accepting arrangements")]
    NotAccepting,
    #[error("already holding this fragment")]
    Duplicate,
    #[error("policy is already held under other terms")]
    ConflictingTerms,
    #[error("not signed by the policy's {0}")]
    Unauthorized(&'static str),
    #[error("no treasure map for this policy")]
    NoTreasureMap,
    #[error("unknown node")]
    UnknownNode,
    #[error("{0}")]
    InvalidProposal(String),
}
