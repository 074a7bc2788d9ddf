use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::characters::{CanSign, Ursula};
use crate::crypto::PublicKey;
use crate::peer::{Message, NodeMetadata, Reply, Transport, TransportError};

/// How a node answers in-process requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeBehavior {
    #[default]
    Online,
    /// Every request fails to connect.
    Offline,
    /// Requests are answered after the given delay.
    Slow(Duration),
    /// Requests are handled, but the reply is lost on the way back.
    LosesReplies,
    /// The sending task panics before anything goes out.
    Crashes,
}

/// Routes requests straight to in-process Ursulas. Messages still go through
/// the bincode codec so wire encoding is exercised.
#[derive(Default)]
pub struct MemoryTransport {
    nodes: RwLock<HashMap<PublicKey, Arc<Ursula>>>,
    behavior: RwLock<HashMap<PublicKey, NodeBehavior>>,
    requests: AtomicUsize,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("nodes", &self.nodes.read().len())
            .field("requests", &self.requests())
            .finish()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, ursula: Arc<Ursula>) {
        self.nodes.write().insert(ursula.stamp(), ursula);
    }

    pub fn set_behavior(&self, node: PublicKey, behavior: NodeBehavior) {
        self.behavior.write().insert(node, behavior);
    }

    /// Requests attempted so far, including failed ones.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, node: &NodeMetadata, message: Message) -> Result<Reply, TransportError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let target = *node.node();
        let behavior = self
            .behavior
            .read()
            .get(&target)
            .copied()
            .unwrap_or_default();

        match behavior {
            NodeBehavior::Offline => return Err(TransportError::Offline(target)),
            NodeBehavior::Crashes => panic!("transport to {target} crashed"),
            NodeBehavior::Slow(delay) => tokio::time::sleep(delay).await,
            NodeBehavior::Online | NodeBehavior::LosesReplies => {}
        }

        let ursula = self
            .nodes
            .read()
            .get(&target)
            .cloned()
            .ok_or(TransportError::Offline(target))?;

        let message: Message = bincode::deserialize(&bincode::serialize(&message)?)?;
        let reply = ursula.handle(message);
        if behavior == NodeBehavior::LosesReplies {
            return Err(TransportError::Stream {
                node: target,
                reason: "connection reset".into(),
            });
        }
        Ok(bincode::deserialize(&bincode::serialize(&reply)?)?)
    }
}
