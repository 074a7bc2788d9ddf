//! All-or-nothing distribution of key fragments
//!
//! Candidates are sorted by node id; slot `i` is first offered to candidate
//! `i`, and a failed slot moves on to the next unused candidate, up to
//! `max_alternates` times. Every offer runs as its own task under a
//! per-request timeout, and the whole negotiation under a ceiling. Either
//! every slot is accepted and a treasure map is signed, or every node that
//! may hold a fragment is told to drop it.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinSet;
use tokio::time::{error::Elapsed, timeout, timeout_at, Instant};

use super::arrangement::{Arrangement, ArrangementProposal, ArrangementStatus, RevocationOrder};
use super::{Hrac, PolicyTerms, Threshold, TreasureMap};
use crate::crypto::pre::VerifiedKeyFrag;
use crate::crypto::{KFragId, PublicKey, SecretKey};
use crate::discovery::NodeDiscovery;
use crate::error::{DestinationFailure, FailureReason, ProtocolError};
use crate::peer::{Message, NodeMetadata, Reply, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Budget for one proposal round trip.
    pub request_timeout: Duration,
    /// Budget for the whole negotiation.
    pub ceiling: Duration,
    /// How many further candidates a slot may try after its first.
    pub max_alternates: usize,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            ceiling: Duration::from_secs(60),
            max_alternates: 3,
        }
    }
}

type Outcome = Result<Result<Reply, TransportError>, Elapsed>;

#[derive(Clone)]
pub struct Negotiator {
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn NodeDiscovery>,
    config: NegotiationConfig,
}

impl std::fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiator")
            .field("config", &self.config)
            .finish()
    }
}

impl Negotiator {
    pub fn new(
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn NodeDiscovery>,
        config: NegotiationConfig,
    ) -> Self {
        Self {
            transport,
            discovery,
            config,
        }
    }

    /// Place every fragment with a distinct candidate and sign the map, or
    /// fail with [`ProtocolError::EnactmentFailure`] leaving no fragment
    /// behind on purpose.
    pub async fn negotiate(
        &self,
        terms: &PolicyTerms,
        threshold: Threshold,
        kfrags: Vec<VerifiedKeyFrag>,
        candidates: impl IntoIterator<Item = PublicKey>,
        signer: &SecretKey,
    ) -> Result<TreasureMap, ProtocolError> {
        let required = kfrags.len();
        if required != threshold.n() {
            return Err(ProtocolError::InvalidThreshold {
                m: threshold.m(),
                n: required,
            });
        }

        let candidates: BTreeSet<PublicKey> = candidates.into_iter().collect();
        let lookups = join_all(
            candidates
                .iter()
                .map(|node| self.discovery.ensure_known(node)),
        )
        .await;

        let mut failures = Vec::new();
        let mut pending = VecDeque::new();
        for (node, lookup) in candidates.iter().zip(lookups) {
            match lookup {
                Ok(metadata) => pending.push_back(metadata),
                Err(e) => {
                    tracing::debug!("skipping candidate {}: {}", node, e);
                    failures.push(DestinationFailure::new(*node, FailureReason::Unresolvable));
                }
            }
        }

        if pending.len() < required {
            tracing::warn!(
                "policy {} needs {} nodes, only {} candidates resolve",
                terms.hrac,
                required,
                pending.len()
            );
            return Err(ProtocolError::EnactmentFailure {
                accepted: 0,
                required,
                failures,
            });
        }

        let mut enactment = Enactment {
            negotiator: self,
            terms,
            signer,
            kfrags,
            pending,
            alternates: vec![0; required],
            arrangements: Vec::new(),
            in_flight: HashSet::new(),
            failures,
            tasks: JoinSet::new(),
        };
        let deadline = Instant::now() + self.config.ceiling;
        let enacted = enactment.run(deadline).await;
        enactment.tasks.abort_all();

        let Enactment {
            arrangements,
            failures,
            ..
        } = enactment;
        let accepted: Vec<(PublicKey, KFragId)> = arrangements
            .iter()
            .filter(|(_, a)| a.status == ArrangementStatus::Accepted)
            .map(|(_, a)| (a.node, a.kfrag_id))
            .collect();

        if enacted {
            let map = TreasureMap::build(
                terms.hrac,
                threshold.m(),
                accepted,
                terms.expiration,
                signer,
            )?;
            // late answers from replaced nodes must not leave fragments behind
            let stragglers: Vec<(PublicKey, KFragId)> = arrangements
                .iter()
                .filter(|(_, a)| {
                    matches!(
                        a.status,
                        ArrangementStatus::Offered | ArrangementStatus::TimedOut
                    )
                })
                .map(|(_, a)| (a.node, a.kfrag_id))
                .collect();
            if !stragglers.is_empty() {
                self.revoke(terms.hrac, stragglers, signer).await;
            }
            tracing::info!(
                "policy {} enacted on {} nodes",
                terms.hrac,
                map.destinations().len()
            );
            return Ok(map);
        }

        // anything not explicitly refused may be holding a fragment
        let targets: Vec<(PublicKey, KFragId)> = arrangements
            .iter()
            .filter(|(_, a)| a.status != ArrangementStatus::Rejected)
            .map(|(_, a)| (a.node, a.kfrag_id))
            .collect();
        tracing::warn!(
            "policy {} not enacted ({} of {} accepted), revoking {} arrangements",
            terms.hrac,
            accepted.len(),
            required,
            targets.len()
        );
        self.revoke(terms.hrac, targets, signer).await;

        Err(ProtocolError::EnactmentFailure {
            accepted: accepted.len(),
            required,
            failures,
        })
    }

    /// Ask each node to drop its fragment. Best effort: returns the nodes
    /// that confirmed.
    pub async fn revoke(
        &self,
        hrac: Hrac,
        targets: Vec<(PublicKey, KFragId)>,
        signer: &SecretKey,
    ) -> Vec<PublicKey> {
        let requests = targets.into_iter().map(|(node, kfrag_id)| {
            let order = RevocationOrder::new(hrac, kfrag_id, signer);
            async move {
                let metadata = self.discovery.ensure_known(&node).await.ok()?;
                let request = self
                    .transport
                    .send(&metadata, Message::RevokeArrangement(order));
                match timeout(self.config.request_timeout, request).await {
                    Ok(Ok(Reply::ArrangementRevoked)) => Some(node),
                    _ => {
                        tracing::debug!("revocation of {} at {} not confirmed", hrac, node);
                        None
                    }
                }
            }
        });
        join_all(requests).await.into_iter().flatten().collect()
    }
}

struct Enactment<'a> {
    negotiator: &'a Negotiator,
    terms: &'a PolicyTerms,
    signer: &'a SecretKey,
    kfrags: Vec<VerifiedKeyFrag>,
    pending: VecDeque<NodeMetadata>,
    alternates: Vec<usize>,
    /// every offer made, with the slot it was made for
    arrangements: Vec<(usize, Arrangement)>,
    in_flight: HashSet<usize>,
    failures: Vec<DestinationFailure>,
    tasks: JoinSet<(usize, Outcome)>,
}

impl Enactment<'_> {
    async fn run(&mut self, deadline: Instant) -> bool {
        for slot in 0..self.kfrags.len() {
            if !self.offer(slot) {
                return false;
            }
        }

        loop {
            let accepted = self
                .arrangements
                .iter()
                .filter(|(_, a)| a.status == ArrangementStatus::Accepted)
                .count();
            if accepted == self.kfrags.len() {
                return true;
            }

            let (index, outcome) = match timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(Ok(joined))) => joined,
                Ok(Some(Err(e))) => {
                    tracing::error!("arrangement task failed: {}", e);
                    return false;
                }
                Ok(None) => return false,
                Err(_) => {
                    tracing::warn!("negotiation for {} hit its ceiling", self.terms.hrac);
                    for index in self.in_flight.drain() {
                        let arrangement = &mut self.arrangements[index].1;
                        arrangement.status = ArrangementStatus::TimedOut;
                        self.failures.push(DestinationFailure::new(
                            arrangement.node,
                            FailureReason::TimedOut,
                        ));
                    }
                    return false;
                }
            };

            self.in_flight.remove(&index);
            if self.settle(index, outcome) {
                continue;
            }
            let slot = self.arrangements[index].0;
            if !(self.use_alternate(slot) && self.offer(slot)) {
                tracing::debug!("slot {} of {} has no candidates left", slot, self.terms.hrac);
                return false;
            }
        }
    }

    fn use_alternate(&mut self, slot: usize) -> bool {
        if self.alternates[slot] >= self.negotiator.config.max_alternates {
            return false;
        }
        self.alternates[slot] += 1;
        true
    }

    /// Offer the slot's fragment to the next unused candidate.
    fn offer(&mut self, slot: usize) -> bool {
        loop {
            let Some(node) = self.pending.pop_front() else {
                return false;
            };
            let kfrag = &self.kfrags[slot];
            let proposal =
                match ArrangementProposal::new(self.terms.clone(), kfrag, node.node(), self.signer)
                {
                    Ok(proposal) => proposal,
                    Err(e) => {
                        self.failures.push(DestinationFailure::new(
                            *node.node(),
                            FailureReason::Unreachable(format!("cannot seal fragment: {e}")),
                        ));
                        if !self.use_alternate(slot) {
                            return false;
                        }
                        continue;
                    }
                };

            tracing::debug!("offering slot {} of {} to {}", slot, self.terms.hrac, node.node());
            let index = self.arrangements.len();
            self.arrangements
                .push((slot, Arrangement::offered(*node.node(), kfrag.id())));
            self.in_flight.insert(index);

            let transport = self.negotiator.transport.clone();
            let request_timeout = self.negotiator.config.request_timeout;
            self.tasks.spawn(async move {
                let request = transport.send(&node, Message::ProposeArrangement(proposal));
                (index, timeout(request_timeout, request).await)
            });
            return true;
        }
    }

    /// Record the outcome of one offer. Returns whether it was accepted.
    fn settle(&mut self, index: usize, outcome: Outcome) -> bool {
        let hrac = self.terms.hrac;
        let arrangement = &mut self.arrangements[index].1;
        let node = arrangement.node;

        let (status, failure) = match outcome {
            Ok(Ok(Reply::ArrangementAccepted(ack)))
                if ack.confirms(&node, &hrac, &arrangement.kfrag_id) =>
            {
                (ArrangementStatus::Accepted, None)
            }
            // the node may hold the fragment but never properly said so
            Ok(Ok(Reply::ArrangementAccepted(_))) => (
                ArrangementStatus::Offered,
                Some(FailureReason::InvalidReply(
                    "acknowledgment does not match the offer".into(),
                )),
            ),
            Ok(Ok(Reply::Refused(reason))) => {
                (ArrangementStatus::Rejected, Some(FailureReason::Refused(reason)))
            }
            Ok(Ok(reply)) => (
                ArrangementStatus::Offered,
                Some(FailureReason::InvalidReply(format!(
                    "unexpected {} reply",
                    reply.kind()
                ))),
            ),
            // the proposal may have landed before the stream broke
            Ok(Err(e)) => (
                ArrangementStatus::TimedOut,
                Some(FailureReason::Unreachable(e.to_string())),
            ),
            Err(_) => (ArrangementStatus::TimedOut, Some(FailureReason::TimedOut)),
        };

        arrangement.status = status;
        match failure {
            None => {
                tracing::debug!("{} accepted its fragment of {}", node, hrac);
                true
            }
            Some(reason) => {
                tracing::debug!("{} did not accept its fragment of {}: {}", node, hrac, reason);
                self.failures.push(DestinationFailure::new(node, reason));
                false
            }
        }
    }
}
