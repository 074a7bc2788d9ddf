use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use http::request::Parts;

use common::discovery::NodeDiscovery;
use common::peer::Node;

use crate::ServiceState;

#[async_trait]
pub trait DataSource {
    /// Perform various checks on the system to ensure its healthy and ready to accept requests.
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("one or more dependent services aren't available")]
    DependencyFailure,

    #[error("no other nodes are known yet")]
    Isolated,

    #[error("service has received signal indicating it should shutdown")]
    ShuttingDown,
}

pub type DynDataSource = Arc<dyn DataSource + Send + Sync>;

pub struct StateDataSource(DynDataSource);

impl Debug for StateDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDataSource").finish()
    }
}

impl StateDataSource {
    #[cfg(test)]
    pub fn new(dds: DynDataSource) -> Self {
        Self(dds)
    }
}

impl Deref for StateDataSource {
    type Target = DynDataSource;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Ready while the node endpoint is open and at least one other node is
/// known, so policies can be granted and retrieved.
struct NodeSource {
    node: Option<Node>,
    known_nodes: usize,
}

#[async_trait]
impl DataSource for NodeSource {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        if let Some(node) = &self.node {
            if node.endpoint().is_closed() {
                return Err(DataSourceError::ShuttingDown);
            }
        }
        if self.known_nodes == 0 {
            return Err(DataSourceError::Isolated);
        }
        Ok(())
    }
}

#[async_trait]
impl FromRequestParts<ServiceState> for StateDataSource {
    type Rejection = ();

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        Ok(StateDataSource(Arc::new(NodeSource {
            node: state.node().cloned(),
            known_nodes: state.registry().known_nodes().len(),
        })))
    }
}
