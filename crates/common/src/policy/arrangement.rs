//! Arrangements: one offer of one key fragment to one Ursula
//!
//! Every message Alice sends an Ursula about a policy carries her signature,
//! and every acceptance carries the Ursula's, so neither side relies on the
//! transport to know who it is talking to.

use serde::{Deserialize, Serialize};

use super::Hrac;
use crate::crypto::pre::{KeyFrag, VerifiedKeyFrag};
use crate::crypto::{EncryptingKey, KFragId, PublicKey, SealError, SealedEnvelope, SecretKey};
use crate::crypto::{PreError, Signature};

const PROPOSAL_DOMAIN: &[u8] = b"trove/arrangement-proposal";
const ACK_DOMAIN: &[u8] = b"trove/arrangement-ack";
const REVOCATION_DOMAIN: &[u8] = b"trove/arrangement-revocation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrangementStatus {
    Offered,
    Accepted,
    Rejected,
    TimedOut,
}

/// Negotiation bookkeeping for one attempt. Dropped once the map is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arrangement {
    pub node: PublicKey,
    pub kfrag_id: KFragId,
    pub status: ArrangementStatus,
}

impl Arrangement {
    pub fn offered(node: PublicKey, kfrag_id: KFragId) -> Self {
        Self {
            node,
            kfrag_id,
            status: ArrangementStatus::Offered,
        }
    }
}

/// The policy-wide part of every proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTerms {
    pub hrac: Hrac,
    /// Alice's verifying key.
    pub publisher: PublicKey,
    /// Also the key every fragment of the policy is signed with.
    pub policy_key: EncryptingKey,
    pub bob_encrypting_key: EncryptingKey,
    /// Bob signs his re-encryption requests with this key.
    pub bob_signing_key: PublicKey,
    /// Unix seconds after which Ursulas drop the policy.
    pub expiration: Option<u64>,
}

impl PolicyTerms {
    fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + 2 * 32 + 2 * 33 + 9);
        out.extend_from_slice(self.hrac.as_bytes());
        out.extend_from_slice(self.publisher.as_bytes());
        out.extend_from_slice(&self.policy_key.to_bytes());
        out.extend_from_slice(&self.bob_encrypting_key.to_bytes());
        out.extend_from_slice(self.bob_signing_key.as_bytes());
        match self.expiration {
            Some(expiration) => {
                out.push(1);
                out.extend_from_slice(&expiration.to_be_bytes());
            }
            None => out.push(0),
        }
        out
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArrangementError {
    #[error("proposal is not signed by its publisher")]
    BadSignature,
    #[error("key fragment envelope: {0}")]
    Envelope(#[from] SealError),
    #[error("key fragment is malformed: {0}")]
    MalformedFragment(PreError),
    #[error("key fragment does not belong to this policy: {0}")]
    ForeignFragment(PreError),
}

/// Alice's offer of one key fragment, sealed for the node it is offered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangementProposal {
    pub terms: PolicyTerms,
    pub kfrag: SealedEnvelope,
    pub signature: Signature,
}

fn proposal_message(terms: &PolicyTerms, kfrag: &SealedEnvelope) -> Vec<u8> {
    let mut message = PROPOSAL_DOMAIN.to_vec();
    message.extend_from_slice(&terms.signed_bytes());
    message.extend_from_slice(kfrag.as_bytes());
    message
}

impl ArrangementProposal {
    pub fn new(
        terms: PolicyTerms,
        kfrag: &VerifiedKeyFrag,
        node: &PublicKey,
        signer: &SecretKey,
    ) -> Result<Self, SealError> {
        let kfrag = SealedEnvelope::seal(&kfrag.to_bytes(), node)?;
        let signature = signer.sign(&proposal_message(&terms, &kfrag));
        Ok(Self {
            terms,
            kfrag,
            signature,
        })
    }

    /// Check the publisher's signature, unseal the fragment with the node's
    /// key and check the fragment was issued for these terms.
    pub fn open(&self, node: &SecretKey) -> Result<VerifiedKeyFrag, ArrangementError> {
        let message = proposal_message(&self.terms, &self.kfrag);
        if !self.terms.publisher.is_valid_signature(&message, &self.signature) {
            return Err(ArrangementError::BadSignature);
        }
        let bytes = self.kfrag.open(node)?;
        let kfrag = KeyFrag::from_bytes(&bytes).map_err(ArrangementError::MalformedFragment)?;
        kfrag
            .verify(
                &self.terms.policy_key,
                &self.terms.policy_key,
                &self.terms.bob_encrypting_key,
            )
            .map_err(ArrangementError::ForeignFragment)
    }
}

/// An Ursula's signed promise to hold `kfrag_id` for `hrac`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrangementAck {
    pub hrac: Hrac,
    pub kfrag_id: KFragId,
    pub node: PublicKey,
    pub signature: Signature,
}

fn ack_message(hrac: &Hrac, kfrag_id: &KFragId) -> Vec<u8> {
    let mut message = ACK_DOMAIN.to_vec();
    message.extend_from_slice(hrac.as_bytes());
    message.extend_from_slice(&kfrag_id.0);
    message
}

impl ArrangementAck {
    pub fn new(hrac: Hrac, kfrag_id: KFragId, node: &SecretKey) -> Self {
        let signature = node.sign(&ack_message(&hrac, &kfrag_id));
        Self {
            hrac,
            kfrag_id,
            node: node.public(),
            signature,
        }
    }

    /// Whether this acknowledges exactly the offer Alice made to `node`.
    pub fn confirms(&self, node: &PublicKey, hrac: &Hrac, kfrag_id: &KFragId) -> bool {
        self.node == *node
            && self.hrac == *hrac
            && self.kfrag_id == *kfrag_id
            && node.is_valid_signature(&ack_message(hrac, kfrag_id), &self.signature)
    }
}

/// Alice's order to drop one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationOrder {
    pub hrac: Hrac,
    pub kfrag_id: KFragId,
    pub signature: Signature,
}

fn revocation_message(hrac: &Hrac, kfrag_id: &KFragId) -> Vec<u8> {
    let mut message = REVOCATION_DOMAIN.to_vec();
    message.extend_from_slice(hrac.as_bytes());
    message.extend_from_slice(&kfrag_id.0);
    message
}

impl RevocationOrder {
    pub fn new(hrac: Hrac, kfrag_id: KFragId, publisher: &SecretKey) -> Self {
        let signature = publisher.sign(&revocation_message(&hrac, &kfrag_id));
        Self {
            hrac,
            kfrag_id,
            signature,
        }
    }

    pub fn verify(&self, publisher: &PublicKey) -> bool {
        publisher.is_valid_signature(
            &revocation_message(&self.hrac, &self.kfrag_id),
            &self.signature,
        )
    }
}
