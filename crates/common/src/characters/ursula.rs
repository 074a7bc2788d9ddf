//! The node side of the protocol
//!
//! An Ursula holds key fragments it agreed to hold, re-encrypts capsules for
//! the Bob named in a policy, stores treasure maps Alice publishes and tells
//! other nodes about the nodes it knows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::powers::{CanReencrypt, CanSign, Refusal};
use crate::crypto::pre::reencrypt;
use crate::crypto::{CapsuleFrag, KFragId, PublicKey, SecretKey, VerifiedKeyFrag};
use crate::discovery::NodeDiscovery;
use crate::peer::{Message, NodeMetadata, ReencryptionRequest, Reply, TreasureMapPublication};
use crate::policy::{
    ArrangementAck, ArrangementProposal, EncryptedTreasureMap, Hrac, PolicyTerms, RevocationOrder,
};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}

struct HeldFragment {
    terms: PolicyTerms,
    kfrag: VerifiedKeyFrag,
}

pub struct Ursula {
    signer: SecretKey,
    fragments: RwLock<HashMap<(Hrac, KFragId), HeldFragment>>,
    treasure_maps: RwLock<HashMap<Hrac, EncryptedTreasureMap>>,
    metadata: RwLock<Option<NodeMetadata>>,
    discovery: Option<Arc<dyn NodeDiscovery>>,
    accepting: AtomicBool,
    clock: fn() -> u64,
}

impl std::fmt::Debug for Ursula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ursula")
            .field("node", &self.signer.public())
            .field("fragments", &self.fragments.read().len())
            .field("treasure_maps", &self.treasure_maps.read().len())
            .finish()
    }
}

impl CanSign for Ursula {
    fn signing_key(&self) -> &SecretKey {
        &self.signer
    }
}

impl Ursula {
    pub fn new(signer: SecretKey) -> Self {
        Self {
            signer,
            fragments: RwLock::new(HashMap::new()),
            treasure_maps: RwLock::new(HashMap::new()),
            metadata: RwLock::new(None),
            discovery: None,
            accepting: AtomicBool::new(true),
            clock: unix_now,
        }
    }

    /// Answer learn-about requests from this registry.
    pub fn with_discovery(mut self, discovery: Arc<dyn NodeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Metadata handed out when someone asks about this node.
    pub fn set_metadata(&self, metadata: NodeMetadata) {
        *self.metadata.write() = Some(metadata);
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Relaxed);
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.read().len()
    }

    pub fn holds(&self, hrac: &Hrac) -> bool {
        self.fragments.read().keys().any(|(held, _)| held == hrac)
    }

    pub fn handle(&self, message: Message) -> Reply {
        let result = match message {
            Message::ProposeArrangement(proposal) => self
                .accept_arrangement(proposal)
                .map(Reply::ArrangementAccepted),
            Message::RevokeArrangement(order) => {
                self.revoke(order).map(|()| Reply::ArrangementRevoked)
            }
            Message::Reencrypt(request) => self.reencrypt(&request).map(Reply::CapsuleFrag),
            Message::PublishTreasureMap(publication) => self
                .store_treasure_map(publication)
                .map(|()| Reply::TreasureMapStored),
            Message::FetchTreasureMap(hrac) => self.treasure_map(&hrac).map(Reply::TreasureMap),
            Message::LearnAbout(node) => self.learn_about(&node).map(Reply::NodeMetadata),
        };
        result.unwrap_or_else(|refusal| {
            tracing::debug!("{} refused: {}", self.stamp(), refusal);
            Reply::refused(refusal.to_string())
        })
    }

    fn accept_arrangement(&self, proposal: ArrangementProposal) -> Result<ArrangementAck, Refusal> {
        if !self.accepting.load(Ordering::Relaxed) {
            return Err(Refusal::NotAccepting);
        }
        if proposal.terms.is_expired((self.clock)()) {
            return Err(Refusal::Expired);
        }
        let kfrag = proposal
            .open(&self.signer)
            .map_err(|e| Refusal::InvalidProposal(e.to_string()))?;

        let hrac = proposal.terms.hrac;
        let kfrag_id = kfrag.id();
        let mut fragments = self.fragments.write();
        if fragments.contains_key(&(hrac, kfrag_id)) {
            return Err(Refusal::Duplicate);
        }
        // every fragment held for one hrac shares one set of terms
        if fragments
            .iter()
            .any(|((held, _), fragment)| *held == hrac && fragment.terms != proposal.terms)
        {
            tracing::warn!("refusing fragment for {} under conflicting terms", hrac);
            return Err(Refusal::ConflictingTerms);
        }
        fragments.insert(
            (hrac, kfrag_id),
            HeldFragment {
                terms: proposal.terms,
                kfrag,
            },
        );
        tracing::info!("holding fragment {} of policy {}", kfrag_id, hrac);
        Ok(ArrangementAck::new(hrac, kfrag_id, &self.signer))
    }

    fn revoke(&self, order: RevocationOrder) -> Result<(), Refusal> {
        let key = (order.hrac, order.kfrag_id);
        let mut fragments = self.fragments.write();
        let held = fragments.get(&key).ok_or(Refusal::UnknownArrangement)?;
        if !order.verify(&held.terms.publisher) {
            return Err(Refusal::Unauthorized("publisher"));
        }
        fragments.remove(&key);
        let still_held = fragments.keys().any(|(hrac, _)| *hrac == order.hrac);
        drop(fragments);

        if !still_held {
            self.treasure_maps.write().remove(&order.hrac);
        }
        tracing::info!("revoked fragment {} of policy {}", order.kfrag_id, order.hrac);
        Ok(())
    }

    /// Terms of the policy held for `hrac`. Expired policies are dropped on
    /// sight.
    fn live_terms(&self, hrac: &Hrac) -> Result<PolicyTerms, Refusal> {
        let terms = self
            .fragments
            .read()
            .iter()
            .find(|((held, _), _)| held == hrac)
            .map(|(_, held)| held.terms.clone())
            .ok_or(Refusal::UnknownArrangement)?;
        self.check_expiry(&terms)?;
        Ok(terms)
    }

    fn check_expiry(&self, terms: &PolicyTerms) -> Result<(), Refusal> {
        if terms.is_expired((self.clock)()) {
            self.drop_policy(terms);
            return Err(Refusal::Expired);
        }
        Ok(())
    }

    /// Forget every fragment held under `terms`, and the policy's map once
    /// nothing else is held for its hrac.
    fn drop_policy(&self, terms: &PolicyTerms) {
        let mut fragments = self.fragments.write();
        fragments.retain(|(held, _), fragment| *held != terms.hrac || fragment.terms != *terms);
        let still_held = fragments.keys().any(|(held, _)| *held == terms.hrac);
        drop(fragments);

        if !still_held {
            self.treasure_maps.write().remove(&terms.hrac);
        }
        tracing::info!("dropped expired policy {}", terms.hrac);
    }

    fn store_treasure_map(&self, publication: TreasureMapPublication) -> Result<(), Refusal> {
        let terms = self.live_terms(&publication.hrac)?;
        if !publication.verify(&terms.publisher) {
            return Err(Refusal::Unauthorized("publisher"));
        }
        self.treasure_maps
            .write()
            .insert(publication.hrac, publication.map);
        tracing::debug!("stored treasure map for {}", publication.hrac);
        Ok(())
    }

    fn treasure_map(&self, hrac: &Hrac) -> Result<EncryptedTreasureMap, Refusal> {
        self.live_terms(hrac)?;
        self.treasure_maps
            .read()
            .get(hrac)
            .cloned()
            .ok_or(Refusal::NoTreasureMap)
    }

    fn learn_about(&self, node: &PublicKey) -> Result<NodeMetadata, Refusal> {
        if *node == self.stamp() {
            if let Some(metadata) = self.metadata.read().clone() {
                return Ok(metadata);
            }
        }
        self.discovery
            .as_ref()
            .and_then(|discovery| discovery.resolve(node))
            .ok_or(Refusal::UnknownNode)
    }
}

impl CanReencrypt for Ursula {
    fn reencrypt(&self, request: &ReencryptionRequest) -> Result<CapsuleFrag, Refusal> {
        let (terms, kfrag) = self
            .fragments
            .read()
            .get(&(request.hrac, request.kfrag_id))
            .map(|held| (held.terms.clone(), held.kfrag.clone()))
            .ok_or(Refusal::UnknownArrangement)?;
        self.check_expiry(&terms)?;
        if !request.verify(&terms.bob_signing_key) {
            return Err(Refusal::Unauthorized("bob"));
        }
        tracing::trace!("re-encrypting for policy {}", request.hrac);
        Ok(reencrypt(&request.capsule, &kfrag).unverify())
    }
}
