//! Policies: who may decrypt what, and where the key fragments live
//!
//! A policy is addressed by its [`Hrac`]. Granting one splits a
//! re-encryption key into fragments ([`split`]), places every fragment with a
//! distinct Ursula ([`Negotiator`]), and records where they went in a signed
//! [`TreasureMap`] that only Bob can read.

mod arrangement;
mod hrac;
mod message_kit;
mod negotiator;
mod splitter;
mod treasure_map;

use std::collections::BTreeMap;

pub use arrangement::{
    Arrangement, ArrangementAck, ArrangementError, ArrangementProposal, ArrangementStatus,
    PolicyTerms, RevocationOrder,
};
pub use hrac::{Hrac, HRAC_SIZE};
pub use message_kit::{encrypt_message, MessageKit};
pub use negotiator::{NegotiationConfig, Negotiator};
pub use splitter::{split, RekeyMaterial, Threshold};
pub use treasure_map::{EncryptedTreasureMap, TreasureMap, TreasureMapError, VerifiedTreasureMap};

use crate::crypto::{EncryptingKey, KFragId, PublicKey};

/// A policy as Alice created it. Immutable once enacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub hrac: Hrac,
    pub label: String,
    pub threshold: Threshold,
    pub policy_key: EncryptingKey,
    pub bob_encrypting_key: EncryptingKey,
    pub bob_signing_key: PublicKey,
    pub expiration: Option<u64>,
}

impl Policy {
    pub fn terms(&self, publisher: PublicKey) -> PolicyTerms {
        PolicyTerms {
            hrac: self.hrac,
            publisher,
            policy_key: self.policy_key,
            bob_encrypting_key: self.bob_encrypting_key,
            bob_signing_key: self.bob_signing_key,
            expiration: self.expiration,
        }
    }
}

/// A policy whose fragments are held by Ursulas.
#[derive(Debug, Clone)]
pub struct EnactedPolicy {
    pub policy: Policy,
    pub treasure_map: EncryptedTreasureMap,
    pub destinations: BTreeMap<PublicKey, KFragId>,
}
