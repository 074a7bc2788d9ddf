use std::sync::Arc;
use std::time::Duration;

use super::transport::{MemoryTransport, NodeBehavior};
use crate::characters::{Alice, Bob, CanSign, Ursula};
use crate::crypto::{DecryptingKey, DelegatingSecret, PublicKey, SecretKey};
use crate::discovery::{NodeDiscovery, NodeRegistry};
use crate::peer::NodeMetadata;
use crate::policy::{Hrac, NegotiationConfig};
use crate::retrieval::RetrievalConfig;

/// A set of in-process Ursulas sharing one [`MemoryTransport`]
///
/// Every Ursula knows every other one, so any of them can act as a teacher.
/// Characters built from the network get short timeouts so failure paths
/// finish quickly.
pub struct TestNetwork {
    transport: Arc<MemoryTransport>,
    registry: Arc<NodeRegistry>,
    ursulas: Vec<(NodeMetadata, Arc<Ursula>)>,
}

impl TestNetwork {
    pub fn new() -> Self {
        let transport = Arc::new(MemoryTransport::new());
        let registry = Arc::new(NodeRegistry::new(transport.clone()));
        Self {
            transport,
            registry,
            ursulas: Vec::new(),
        }
    }

    pub fn with_ursulas(count: usize) -> Self {
        let mut net = Self::new();
        for _ in 0..count {
            net.add_ursula();
        }
        net
    }

    /// Start another Ursula and make it known to the network.
    pub fn add_ursula(&mut self) -> PublicKey {
        let key = SecretKey::generate();
        let port = 7000 + self.ursulas.len() as u16;
        let metadata = NodeMetadata::new(
            &key,
            vec![std::net::SocketAddr::from(([127, 0, 0, 1], port))],
            None,
        );
        let ursula = Arc::new(Ursula::new(key).with_discovery(self.registry.clone()));
        ursula.set_metadata(metadata.clone());

        self.transport.register(ursula.clone());
        if let Err(e) = self.registry.remember(metadata.clone()) {
            tracing::error!("test ursula metadata rejected: {}", e);
        }
        let node = ursula.stamp();
        tracing::debug!("started test ursula {}", node);
        self.ursulas.push((metadata, ursula));
        node
    }

    pub fn transport(&self) -> Arc<MemoryTransport> {
        self.transport.clone()
    }

    /// Registry that knows every Ursula.
    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.registry.clone()
    }

    /// An empty registry that learns from the Ursula at `teacher`.
    pub fn registry_taught_by(&self, teacher: usize) -> Arc<NodeRegistry> {
        let registry = NodeRegistry::new(self.transport.clone())
            .with_learn_timeout(Duration::from_millis(500));
        if let Some((metadata, _)) = self.ursulas.get(teacher) {
            if let Err(e) = registry.add_teacher(metadata.clone()) {
                tracing::error!("teacher metadata rejected: {}", e);
            }
        }
        Arc::new(registry)
    }

    pub fn ids(&self) -> Vec<PublicKey> {
        let mut ids: Vec<_> = self.ursulas.iter().map(|(m, _)| *m.node()).collect();
        ids.sort();
        ids
    }

    pub fn ursula(&self, node: &PublicKey) -> Option<&Arc<Ursula>> {
        self.ursulas
            .iter()
            .find(|(metadata, _)| metadata.node() == node)
            .map(|(_, ursula)| ursula)
    }

    pub fn set_behavior(&self, node: &PublicKey, behavior: NodeBehavior) {
        self.transport.set_behavior(*node, behavior);
    }

    pub fn set_offline(&self, node: &PublicKey, offline: bool) {
        let behavior = if offline {
            NodeBehavior::Offline
        } else {
            NodeBehavior::Online
        };
        self.set_behavior(node, behavior);
    }

    /// Make the Ursula refuse every new arrangement.
    pub fn set_rejecting(&self, node: &PublicKey, rejecting: bool) {
        if let Some(ursula) = self.ursula(node) {
            ursula.set_accepting(!rejecting);
        }
    }

    /// Ursulas currently holding a fragment of `hrac`.
    pub fn holders(&self, hrac: &Hrac) -> Vec<PublicKey> {
        self.ursulas
            .iter()
            .filter(|(_, ursula)| ursula.holds(hrac))
            .map(|(metadata, _)| *metadata.node())
            .collect()
    }

    pub fn negotiation_config() -> NegotiationConfig {
        NegotiationConfig {
            request_timeout: Duration::from_millis(500),
            ceiling: Duration::from_secs(5),
            max_alternates: 3,
        }
    }

    pub fn retrieval_config() -> RetrievalConfig {
        RetrievalConfig {
            margin: 1,
            request_timeout: Duration::from_millis(500),
            ceiling: Duration::from_secs(5),
        }
    }

    pub fn alice(&self) -> Alice {
        Alice::new(
            SecretKey::generate(),
            DelegatingSecret::generate(),
            self.transport.clone(),
            self.registry.clone(),
            Self::negotiation_config(),
        )
    }

    pub fn bob(&self) -> Bob {
        self.bob_with(self.registry.clone())
    }

    /// A Bob resolving nodes through `discovery` instead of the shared
    /// registry.
    pub fn bob_with(&self, discovery: Arc<dyn NodeDiscovery>) -> Bob {
        Bob::new(
            SecretKey::generate(),
            DecryptingKey::generate(),
            self.transport.clone(),
            discovery,
            Self::retrieval_config(),
        )
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}
