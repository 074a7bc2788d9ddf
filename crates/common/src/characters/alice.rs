use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;

use super::powers::{CanEncrypt, CanSign};
use super::ursula::unix_now;
use crate::crypto::{DelegatingSecret, EncryptingKey, PublicKey, SecretKey};
use crate::discovery::NodeDiscovery;
use crate::error::ProtocolError;
use crate::peer::{Message, Reply, Transport, TreasureMapPublication};
use crate::policy::{
    split, EnactedPolicy, EncryptedTreasureMap, Hrac, NegotiationConfig, Negotiator, Policy,
    RekeyMaterial, Threshold,
};

/// What Alice needs to know to create a policy for Bob.
#[derive(Debug, Clone)]
pub struct PolicyParams {
    pub bob_encrypting_key: EncryptingKey,
    pub bob_signing_key: PublicKey,
    pub label: String,
    pub m: usize,
    pub n: usize,
    /// Unix seconds.
    pub expiration: Option<u64>,
}

type PolicyKey = (EncryptingKey, String);

/// The data owner: derives policy keys and delegates decryption rights.
pub struct Alice {
    signer: SecretKey,
    delegating: DelegatingSecret,
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn NodeDiscovery>,
    negotiator: Negotiator,
    publish_timeout: Duration,
    enacted: RwLock<HashMap<PolicyKey, EnactedPolicy>>,
}

impl std::fmt::Debug for Alice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alice")
            .field("stamp", &self.stamp())
            .field("enacted", &self.enacted.read().len())
            .finish()
    }
}

impl CanSign for Alice {
    fn signing_key(&self) -> &SecretKey {
        &self.signer
    }
}

impl CanEncrypt for Alice {}

impl Alice {
    pub fn new(
        signer: SecretKey,
        delegating: DelegatingSecret,
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn NodeDiscovery>,
        config: NegotiationConfig,
    ) -> Self {
        let publish_timeout = config.request_timeout;
        let negotiator = Negotiator::new(transport.clone(), discovery.clone(), config);
        Self {
            signer,
            delegating,
            transport,
            discovery,
            negotiator,
            publish_timeout,
            enacted: RwLock::new(HashMap::new()),
        }
    }

    /// Policy encrypting key for `label`. Enrico can encrypt under it before
    /// any policy for the label exists.
    pub fn derive_policy_pubkey(&self, label: &str) -> EncryptingKey {
        self.delegating.policy_key(label.as_bytes()).public()
    }

    /// Validate and record a policy without contacting any node.
    pub fn create_policy(&self, params: &PolicyParams) -> Result<Policy, ProtocolError> {
        let threshold = Threshold::new(params.m, params.n)?;
        if let Some(expiration) = params.expiration {
            if expiration <= unix_now() {
                return Err(ProtocolError::Expired(expiration));
            }
        }

        let policy = Policy {
            hrac: Hrac::derive(
                &self.stamp(),
                &params.bob_encrypting_key,
                params.label.as_bytes(),
            ),
            label: params.label.clone(),
            threshold,
            policy_key: self.derive_policy_pubkey(&params.label),
            bob_encrypting_key: params.bob_encrypting_key,
            bob_signing_key: params.bob_signing_key,
            expiration: params.expiration,
        };
        tracing::debug!("created policy {} for label {:?}", policy.hrac, policy.label);
        Ok(policy)
    }

    /// Split, negotiate and publish. On success every fragment is held by a
    /// distinct node and the encrypted treasure map is returned.
    pub async fn grant(&self, params: &PolicyParams) -> Result<EnactedPolicy, ProtocolError> {
        let policy = self.create_policy(params)?;
        let delegating = self.delegating.policy_key(policy.label.as_bytes());
        let kfrags = split(
            RekeyMaterial {
                delegating: &delegating,
                receiving: &policy.bob_encrypting_key,
            },
            policy.threshold.m(),
            policy.threshold.n(),
        )?;

        let candidates = self
            .discovery
            .known_nodes()
            .into_iter()
            .map(|metadata| *metadata.node());
        let terms = policy.terms(self.stamp());
        let map = self
            .negotiator
            .negotiate(&terms, policy.threshold, kfrags, candidates, &self.signer)
            .await?;

        let destinations = map.destinations().clone();
        let treasure_map = map.encrypt(&policy.bob_encrypting_key)?;
        self.publish(&policy.hrac, &treasure_map, destinations.keys())
            .await;

        let enacted = EnactedPolicy {
            policy,
            treasure_map,
            destinations,
        };
        self.enacted.write().insert(
            (params.bob_encrypting_key, params.label.clone()),
            enacted.clone(),
        );
        tracing::info!(
            "granted policy {} ({}-of-{})",
            enacted.policy.hrac,
            enacted.policy.threshold.m(),
            enacted.policy.threshold.n()
        );
        Ok(enacted)
    }

    /// Store the map with the policy's own nodes so Bob can join by label.
    /// Best effort: returns how many nodes stored it.
    async fn publish<'a>(
        &self,
        hrac: &Hrac,
        map: &EncryptedTreasureMap,
        nodes: impl Iterator<Item = &'a PublicKey>,
    ) -> usize {
        let publication = TreasureMapPublication::new(*hrac, map.clone(), &self.signer);
        let requests = nodes.map(|node| {
            let message = Message::PublishTreasureMap(publication.clone());
            async move {
                let metadata = self.discovery.resolve(node)?;
                let request = self.transport.send(&metadata, message);
                match tokio::time::timeout(self.publish_timeout, request).await {
                    Ok(Ok(Reply::TreasureMapStored)) => Some(()),
                    _ => {
                        tracing::warn!("{} did not store the treasure map for {}", node, hrac);
                        None
                    }
                }
            }
        });
        let stored = join_all(requests).await.into_iter().flatten().count();
        tracing::debug!("treasure map for {} stored on {} nodes", hrac, stored);
        stored
    }

    /// Tell every node holding a fragment of the policy to drop it. Returns
    /// the nodes that confirmed.
    pub async fn revoke(
        &self,
        bob_encrypting_key: &EncryptingKey,
        label: &str,
    ) -> Result<Vec<PublicKey>, ProtocolError> {
        let key = (*bob_encrypting_key, label.to_string());
        let enacted = self
            .enacted
            .write()
            .remove(&key)
            .ok_or_else(|| ProtocolError::UnknownPolicy(label.to_string()))?;

        let targets = enacted.destinations.into_iter().collect();
        let revoked = self
            .negotiator
            .revoke(enacted.policy.hrac, targets, &self.signer)
            .await;
        tracing::info!(
            "revoked policy {} on {} of {} nodes",
            enacted.policy.hrac,
            revoked.len(),
            enacted.policy.threshold.n()
        );
        Ok(revoked)
    }

    pub fn enacted_policy(
        &self,
        bob_encrypting_key: &EncryptingKey,
        label: &str,
    ) -> Option<EnactedPolicy> {
        self.enacted
            .read()
            .get(&(*bob_encrypting_key, label.to_string()))
            .cloned()
    }
}
