//! Threshold collection of capsule fragments
//!
//! Bob asks the Ursulas named in a verified treasure map to re-encrypt a
//! capsule, `m + margin` at a time, refilling the window from the remaining
//! destinations as requests fail. Collection stops at `m` valid fragments;
//! dropping the task set cancels whatever is still in flight.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{Id, JoinSet};
use tokio::time::{timeout, timeout_at, Instant};

use crate::crypto::{
    Capsule, CapsuleFrag, DecryptingKey, EncryptingKey, KFragId, PublicKey, SecretKey,
    VerifiedCapsuleFrag,
};
use crate::discovery::NodeDiscovery;
use crate::error::{DestinationFailure, FailureReason, ProtocolError};
use crate::peer::{Message, ReencryptionRequest, Reply, Transport};
use crate::policy::{MessageKit, VerifiedTreasureMap};

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Requests kept in flight beyond the threshold.
    pub margin: usize,
    pub request_timeout: Duration,
    /// Budget for collecting the fragments of one capsule.
    pub ceiling: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            margin: 1,
            request_timeout: Duration::from_secs(10),
            ceiling: Duration::from_secs(60),
        }
    }
}

/// Bob's keys, as the coordinator needs them.
#[derive(Clone, Copy)]
pub struct Recipient<'a> {
    /// Signs re-encryption requests.
    pub signer: &'a SecretKey,
    pub decrypting: &'a DecryptingKey,
}

/// Accepts capsule fragments for one capsule, counting each destination
/// of the map at most once.
pub struct CFragCollector<'a> {
    map: &'a VerifiedTreasureMap,
    capsule: &'a Capsule,
    policy_key: &'a EncryptingKey,
    receiving: EncryptingKey,
    collected: BTreeMap<PublicKey, VerifiedCapsuleFrag>,
}

impl<'a> CFragCollector<'a> {
    pub fn new(
        map: &'a VerifiedTreasureMap,
        capsule: &'a Capsule,
        policy_key: &'a EncryptingKey,
        receiving: EncryptingKey,
    ) -> Self {
        Self {
            map,
            capsule,
            policy_key,
            receiving,
            collected: BTreeMap::new(),
        }
    }

    /// Count `cfrag` as `node`'s contribution if it is the one the map
    /// expects from that node and its proof holds.
    pub fn offer(&mut self, node: PublicKey, cfrag: CapsuleFrag) -> Result<(), FailureReason> {
        let expected = self
            .map
            .destinations()
            .get(&node)
            .ok_or_else(|| FailureReason::InvalidReply("node is not a destination".into()))?;
        if cfrag.kfrag_id() != *expected {
            return Err(FailureReason::InvalidReply(
                "fragment id does not match the treasure map".into(),
            ));
        }
        if self.collected.contains_key(&node) {
            return Err(FailureReason::InvalidReply("duplicate fragment".into()));
        }
        let verified = cfrag
            .verify(
                self.capsule,
                self.policy_key,
                self.policy_key,
                &self.receiving,
            )
            .map_err(|e| FailureReason::InvalidReply(format!("bad capsule fragment: {e}")))?;
        self.collected.insert(node, verified);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.collected.len() >= self.map.threshold()
    }

    pub fn into_cfrags(self) -> Vec<VerifiedCapsuleFrag> {
        self.collected.into_values().collect()
    }
}

#[derive(Clone)]
pub struct RetrievalCoordinator {
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn NodeDiscovery>,
    config: RetrievalConfig,
}

impl std::fmt::Debug for RetrievalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalCoordinator")
            .field("config", &self.config)
            .finish()
    }
}

impl RetrievalCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn NodeDiscovery>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            transport,
            discovery,
            config,
        }
    }

    /// Gather `m` verified capsule fragments for `capsule`.
    pub async fn collect(
        &self,
        map: &VerifiedTreasureMap,
        capsule: &Capsule,
        policy_key: &EncryptingKey,
        recipient: Recipient<'_>,
    ) -> Result<Vec<VerifiedCapsuleFrag>, ProtocolError> {
        let required = map.threshold();
        let window = required + self.config.margin;
        let mut collector =
            CFragCollector::new(map, capsule, policy_key, recipient.decrypting.public());
        let mut destinations: VecDeque<(PublicKey, KFragId)> = map
            .destinations()
            .iter()
            .map(|(node, kfrag_id)| (*node, *kfrag_id))
            .collect();
        let mut tasks: JoinSet<(PublicKey, Result<CapsuleFrag, FailureReason>)> = JoinSet::new();
        let mut in_flight: HashMap<Id, PublicKey> = HashMap::new();
        let mut failures = Vec::new();

        let deadline = Instant::now() + self.config.ceiling;
        let gathering = async {
            loop {
                while tasks.len() + collector.len() < window {
                    let Some((node, kfrag_id)) = destinations.pop_front() else {
                        break;
                    };
                    let request =
                        ReencryptionRequest::new(
                        *map.hrac(),
                        kfrag_id,
                        capsule.clone(),
                        recipient.signer,
                    );
                    let transport = self.transport.clone();
                    let discovery = self.discovery.clone();
                    let request_timeout = self.config.request_timeout;
                    let task = tasks.spawn(async move {
                        let result =
                            request_cfrag(transport, discovery, node, request, request_timeout)
                                .await;
                        (node, result)
                    });
                    in_flight.insert(task.id(), node);
                }

                if collector.is_complete() {
                    return;
                }

                match tasks.join_next_with_id().await {
                    None => return,
                    Some(Ok((id, (node, result)))) => {
                        in_flight.remove(&id);
                        let outcome = result.and_then(|cfrag| collector.offer(node, cfrag));
                        if let Err(reason) = outcome {
                            tracing::debug!("no capsule fragment from {}: {}", node, reason);
                            failures.push(DestinationFailure::new(node, reason));
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!("re-encryption task failed: {}", e);
                        if let Some(node) = in_flight.remove(&e.id()) {
                            failures.push(DestinationFailure::new(
                                node,
                                FailureReason::Unreachable(format!("request task failed: {e}")),
                            ));
                        }
                    }
                }
            }
        };

        if timeout_at(deadline, gathering).await.is_err() {
            tracing::warn!("retrieval for {} hit its ceiling", map.hrac());
            for node in in_flight.into_values() {
                failures.push(DestinationFailure::new(node, FailureReason::TimedOut));
            }
        }
        drop(tasks);

        if !collector.is_complete() {
            tracing::warn!(
                "only {} of {} capsule fragments for {}",
                collector.len(),
                required,
                map.hrac()
            );
            return Err(ProtocolError::InsufficientFragments {
                collected: collector.len(),
                required,
                failures,
            });
        }
        tracing::info!("collected {} capsule fragments for {}", required, map.hrac());
        Ok(collector.into_cfrags())
    }

    /// Re-encrypt and open one message kit. The data source signature is
    /// checked before any node is contacted.
    pub async fn retrieve(
        &self,
        map: &VerifiedTreasureMap,
        kit: &MessageKit,
        data_source: &PublicKey,
        policy_key: &EncryptingKey,
        recipient: Recipient<'_>,
    ) -> Result<Vec<u8>, ProtocolError> {
        if !kit.verify(data_source) {
            return Err(ProtocolError::BadDataSource);
        }
        let cfrags = self
            .collect(map, kit.capsule(), policy_key, recipient)
            .await?;
        kit.decrypt_reencrypted(data_source, recipient.decrypting, policy_key, &cfrags)
    }
}

async fn request_cfrag(
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn NodeDiscovery>,
    node: PublicKey,
    request: ReencryptionRequest,
    request_timeout: Duration,
) -> Result<CapsuleFrag, FailureReason> {
    let metadata = match discovery.resolve(&node) {
        Some(metadata) => metadata,
        None => discovery
            .ensure_known(&node)
            .await
            .map_err(|_| FailureReason::Unresolvable)?,
    };
    match timeout(request_timeout, transport.send(&metadata, Message::Reencrypt(request))).await {
        Ok(Ok(Reply::CapsuleFrag(cfrag))) => Ok(cfrag),
        Ok(Ok(Reply::Refused(reason))) => Err(FailureReason::Refused(reason)),
        Ok(Ok(reply)) => Err(FailureReason::InvalidReply(format!(
            "unexpected {} reply",
            reply.kind()
        ))),
        Ok(Err(e)) => Err(FailureReason::Unreachable(e.to_string())),
        Err(_) => Err(FailureReason::TimedOut),
    }
}
