use std::sync::Arc;

use iroh::protocol::Router;
use tokio::sync::watch::Receiver as WatchReceiver;

use crate::characters::Ursula;

mod handler;
mod messages;
mod metadata;
mod node;
mod transport;

pub use handler::UrsulaProtocol;
pub use messages::{Message, ReencryptionRequest, Reply, TreasureMapPublication};
pub use metadata::{MetadataError, NodeMetadata};
pub use node::{Node, NodeBuilder, NodeError};
pub use transport::{IrohTransport, Transport, TransportError};

// Re-export iroh types for convenience
pub use iroh::NodeAddr;

/// ALPN identifier for the node protocol
pub const ALPN: &[u8] = b"/trove/pre/1";

/// Upper bound on a single request or reply.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Serve `ursula` on `node` until the shutdown signal fires.
pub async fn spawn(
    node: Node,
    ursula: Arc<Ursula>,
    mut shutdown_rx: WatchReceiver<()>,
) -> anyhow::Result<()> {
    let router = Router::builder(node.endpoint().clone())
        .accept(ALPN, UrsulaProtocol::new(ursula))
        .spawn();
    tracing::info!("node {} accepting on {}", node.id(), node.socket());

    let _ = shutdown_rx.changed().await;

    router.shutdown().await?;
    Ok(())
}
