use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::crypto::PublicKey;
use crate::peer::{Message, NodeMetadata, Reply, Transport};

pub const DEFAULT_LEARN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("node {0} is unknown to every teacher")]
    Unknown(PublicKey),
    #[error("metadata for {0} is not signed by that node")]
    InvalidMetadata(PublicKey),
}

/// Where nodes are and how to learn about the ones we have not met.
#[async_trait]
pub trait NodeDiscovery: Send + Sync + 'static {
    /// Address of a node we already know.
    fn resolve(&self, node: &PublicKey) -> Option<NodeMetadata>;

    /// Resolve `node`, asking teacher nodes about it if needed.
    async fn ensure_known(&self, node: &PublicKey) -> Result<NodeMetadata, DiscoveryError>;

    fn known_nodes(&self) -> Vec<NodeMetadata>;

    /// Add or refresh a node. Older metadata never replaces newer.
    fn remember(&self, metadata: NodeMetadata) -> Result<(), DiscoveryError>;

    /// Drop every learned node, keeping teachers. Returns how many went.
    fn forget_all(&self) -> usize;
}

/// Read-mostly registry of node metadata, learning unknown nodes from a
/// fixed set of teachers.
pub struct NodeRegistry {
    nodes: RwLock<HashMap<PublicKey, NodeMetadata>>,
    teachers: RwLock<HashSet<PublicKey>>,
    transport: Arc<dyn Transport>,
    learn_timeout: Duration,
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.nodes.read().len())
            .field("teachers", &self.teachers.read().len())
            .finish()
    }
}

impl NodeRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            teachers: RwLock::new(HashSet::new()),
            transport,
            learn_timeout: DEFAULT_LEARN_TIMEOUT,
        }
    }

    pub fn with_learn_timeout(mut self, timeout: Duration) -> Self {
        self.learn_timeout = timeout;
        self
    }

    /// Remember `metadata` and ask its node about others from now on.
    /// Teachers survive [`NodeDiscovery::forget_all`].
    pub fn add_teacher(&self, metadata: NodeMetadata) -> Result<(), DiscoveryError> {
        let node = *metadata.node();
        self.remember(metadata)?;
        self.teachers.write().insert(node);
        Ok(())
    }

    fn teacher_metadata(&self) -> Vec<NodeMetadata> {
        let teachers = self.teachers.read();
        let nodes = self.nodes.read();
        teachers
            .iter()
            .filter_map(|teacher| nodes.get(teacher).cloned())
            .collect()
    }

    async fn ask_teacher(&self, teacher: &NodeMetadata, node: &PublicKey) -> Option<NodeMetadata> {
        let request = self.transport.send(teacher, Message::LearnAbout(*node));
        match tokio::time::timeout(self.learn_timeout, request).await {
            Ok(Ok(Reply::NodeMetadata(metadata))) => Some(metadata),
            Ok(Ok(reply)) => {
                tracing::debug!(
                    "teacher {} answered {} about {}",
                    teacher.node(),
                    reply.kind(),
                    node
                );
                None
            }
            Ok(Err(e)) => {
                tracing::debug!("teacher {} unreachable: {}", teacher.node(), e);
                None
            }
            Err(_) => {
                tracing::debug!("teacher {} timed out", teacher.node());
                None
            }
        }
    }
}

#[async_trait]
impl NodeDiscovery for NodeRegistry {
    fn resolve(&self, node: &PublicKey) -> Option<NodeMetadata> {
        self.nodes.read().get(node).cloned()
    }

    async fn ensure_known(&self, node: &PublicKey) -> Result<NodeMetadata, DiscoveryError> {
        if let Some(metadata) = self.resolve(node) {
            return Ok(metadata);
        }

        for teacher in self.teacher_metadata() {
            let Some(metadata) = self.ask_teacher(&teacher, node).await else {
                continue;
            };
            // a teacher can only relay what the node itself signed
            if metadata.node() != node || !metadata.verify() {
                tracing::warn!(
                    "teacher {} returned bad metadata for {}",
                    teacher.node(),
                    node
                );
                continue;
            }
            tracing::debug!("learned about {} from {}", node, teacher.node());
            self.remember(metadata.clone())?;
            return Ok(metadata);
        }

        Err(DiscoveryError::Unknown(*node))
    }

    fn known_nodes(&self) -> Vec<NodeMetadata> {
        let mut nodes: Vec<_> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.node().cmp(b.node()));
        nodes
    }

    fn remember(&self, metadata: NodeMetadata) -> Result<(), DiscoveryError> {
        if !metadata.verify() {
            return Err(DiscoveryError::InvalidMetadata(*metadata.node()));
        }
        let mut nodes = self.nodes.write();
        match nodes.get(metadata.node()) {
            Some(existing) if existing.timestamp() > metadata.timestamp() => {}
            _ => {
                nodes.insert(*metadata.node(), metadata);
            }
        }
        Ok(())
    }

    fn forget_all(&self) -> usize {
        let teachers = self.teachers.read();
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|node, _| teachers.contains(node));
        let forgotten = before - nodes.len();
        tracing::info!("forgot {} known nodes", forgotten);
        forgotten
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::peer::TransportError;

    /// Every node answers learn-about requests from a fixed book.
    struct Teachers {
        book: HashMap<PublicKey, NodeMetadata>,
    }

    #[async_trait]
    impl Transport for Teachers {
        async fn send(
            &self,
            _node: &NodeMetadata,
            message: Message,
        ) -> Result<Reply, TransportError> {
            match message {
                Message::LearnAbout(node) => Ok(self
                    .book
                    .get(&node)
                    .cloned()
                    .map(Reply::NodeMetadata)
                    .unwrap_or_else(|| Reply::refused("unknown node"))),
                _ => Ok(Reply::refused("unsupported")),
            }
        }
    }

    fn metadata(timestamp: u64) -> (SecretKey, NodeMetadata) {
        let key = SecretKey::generate();
        let metadata = NodeMetadata::with_timestamp(
            &key,
            vec!["127.0.0.1:9000".parse().unwrap()],
            None,
            timestamp,
        );
        (key, metadata)
    }

    fn registry(book: Vec<NodeMetadata>) -> NodeRegistry {
        let book = book.into_iter().map(|m| (*m.node(), m)).collect();
        NodeRegistry::new(Arc::new(Teachers { book }))
    }

    #[tokio::test]
    async fn test_learns_unknown_nodes_from_teachers() {
        let (_, stranger) = metadata(1);
        let registry = registry(vec![stranger.clone()]);
        assert!(registry.resolve(stranger.node()).is_none());
        assert!(matches!(
            registry.ensure_known(stranger.node()).await,
            Err(DiscoveryError::Unknown(_))
        ));

        let (_, teacher) = metadata(1);
        registry.add_teacher(teacher).unwrap();
        let learned = registry.ensure_known(stranger.node()).await.unwrap();
        assert_eq!(learned, stranger);
        assert_eq!(registry.resolve(stranger.node()), Some(stranger));
    }

    #[tokio::test]
    async fn test_forged_metadata_is_not_learned() {
        let (_, genuine) = metadata(1);
        let (mallory, _) = metadata(1);
        // mallory's teacher hands out its own metadata under another node's id
        let forged = NodeMetadata::with_timestamp(&mallory, vec![], None, 2);
        let target = *genuine.node();
        let book = HashMap::from([(target, forged)]);
        let registry = NodeRegistry::new(Arc::new(Teachers { book }));
        let (_, teacher) = metadata(1);
        registry.add_teacher(teacher).unwrap();

        assert!(registry.ensure_known(&target).await.is_err());
        assert!(registry.resolve(&target).is_none());
    }

    #[test]
    fn test_remember_keeps_newest() {
        let registry = registry(vec![]);
        let key = SecretKey::generate();
        let old = NodeMetadata::with_timestamp(&key, vec![], None, 10);
        let new = NodeMetadata::with_timestamp(&key, vec![], None, 20);

        registry.remember(new.clone()).unwrap();
        registry.remember(old).unwrap();
        assert_eq!(registry.resolve(&key.public()), Some(new));
        assert_eq!(registry.known_nodes().len(), 1);
    }

    #[test]
    fn test_forget_all_keeps_teachers() {
        let registry = registry(vec![]);
        let (_, teacher) = metadata(1);
        registry.add_teacher(teacher.clone()).unwrap();
        for _ in 0..3 {
            registry.remember(metadata(1).1).unwrap();
        }
        assert_eq!(registry.known_nodes().len(), 4);
        assert_eq!(registry.forget_all(), 3);
        assert_eq!(registry.known_nodes(), vec![teacher]);
    }
}
