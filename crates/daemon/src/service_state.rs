use std::sync::Arc;

use common::characters::{Alice, Bob, CanSign, Enrico, Ursula};
use common::discovery::{NodeDiscovery, NodeRegistry};
use common::peer::{Node, NodeBuilder, NodeError, Transport};
use common::prelude::{DecryptingKey, DelegatingSecret, EncryptingKey, SecretKey};

use crate::service_config::Config;
use crate::state::NodeKeys;

/// Main service state - the node and the characters it plays
#[derive(Clone)]
pub struct State {
    inner: Arc<Inner>,
}

struct Inner {
    node: Option<Node>,
    signer: SecretKey,
    registry: Arc<NodeRegistry>,
    ursula: Arc<Ursula>,
    alice: Alice,
    bob: Bob,
    default_policy_key: Option<EncryptingKey>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("node", &self.inner.ursula.stamp())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl State {
    /// Bind the iroh node and build every character on top of it.
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        let keys = config.keys.clone().unwrap_or_else(|| NodeKeys {
            signer: SecretKey::generate(),
            decrypting: DecryptingKey::generate(),
            delegating: DelegatingSecret::generate(),
        });

        let mut builder = NodeBuilder::new().secret_key(keys.signer.clone());
        if let Some(addr) = config.node_listen_addr {
            builder = builder.socket_address(addr);
        }
        let node = builder.build().await?;

        tracing::info!("Node id: {}", node.id());
        tracing::info!("Node listening on: {:?}", node.endpoint().bound_sockets());

        let transport: Arc<dyn Transport> = Arc::new(node.transport());
        let state = Self::build(config, keys, transport, Some(node))?;
        if let Some(node) = state.node() {
            state.inner.ursula.set_metadata(node.metadata());
        }
        Ok(state)
    }

    /// Characters over an already running transport, with no node of our own
    /// serving requests.
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, StateSetupError> {
        let keys = config.keys.clone().ok_or(StateSetupError::MissingKeys)?;
        Self::build(config, keys, transport, None)
    }

    fn build(
        config: &Config,
        keys: NodeKeys,
        transport: Arc<dyn Transport>,
        node: Option<Node>,
    ) -> Result<Self, StateSetupError> {
        let registry = Arc::new(NodeRegistry::new(transport.clone()));
        for teacher in &config.teachers {
            registry
                .add_teacher(teacher.clone())
                .map_err(|e| StateSetupError::Teacher(e.to_string()))?;
        }
        let discovery: Arc<dyn NodeDiscovery> = registry.clone();

        let ursula = Arc::new(Ursula::new(keys.signer.clone()).with_discovery(discovery.clone()));
        let alice = Alice::new(
            keys.signer.clone(),
            keys.delegating,
            transport.clone(),
            discovery.clone(),
            config.negotiation.clone(),
        );
        let bob = Bob::new(
            keys.signer.clone(),
            keys.decrypting,
            transport,
            discovery,
            config.retrieval.clone(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                node,
                signer: keys.signer,
                registry,
                ursula,
                alice,
                bob,
                default_policy_key: config.default_policy_key,
            }),
        })
    }

    pub fn node(&self) -> Option<&Node> {
        self.inner.node.as_ref()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.inner.registry
    }

    pub fn ursula(&self) -> &Arc<Ursula> {
        &self.inner.ursula
    }

    pub fn alice(&self) -> &Alice {
        &self.inner.alice
    }

    pub fn bob(&self) -> &Bob {
        &self.inner.bob
    }

    /// Enrico signing as this node, so Bob can check kits against our id.
    pub fn enrico(&self, policy_key: EncryptingKey) -> Enrico {
        Enrico::new(self.inner.signer.clone(), policy_key)
    }

    pub fn default_policy_key(&self) -> Option<&EncryptingKey> {
        self.inner.default_policy_key.as_ref()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("node setup error: {0}")]
    Node(#[from] NodeError),
    #[error("keys are required when running over an external transport")]
    MissingKeys,
    #[error("teacher rejected: {0}")]
    Teacher(String),
}
