use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;
use iroh::endpoint::Connection;
use iroh::protocol::{AcceptError, ProtocolHandler};

use super::messages::Message;
use super::MAX_MESSAGE_SIZE;
use crate::characters::Ursula;

/// Serves an [`Ursula`] on the node protocol ALPN.
#[derive(Debug, Clone)]
pub struct UrsulaProtocol {
    ursula: Arc<Ursula>,
}

impl UrsulaProtocol {
    pub fn new(ursula: Arc<Ursula>) -> Self {
        Self { ursula }
    }
}

fn accept_error(e: impl std::fmt::Display) -> AcceptError {
    let err: Box<dyn std::error::Error + Send + Sync> = anyhow!("{}", e).into();
    AcceptError::from(err)
}

impl ProtocolHandler for UrsulaProtocol {
    #[allow(refining_impl_trait)]
    fn accept(&self, conn: Connection) -> BoxFuture<'static, Result<(), AcceptError>> {
        let ursula = self.ursula.clone();
        Box::pin(async move {
            let remote = conn
                .remote_node_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            tracing::debug!("new connection from {}", remote);

            let (mut send, mut recv) = conn.accept_bi().await.map_err(|e| {
                tracing::error!("failed to accept bidirectional stream: {}", e);
                AcceptError::from(e)
            })?;

            let message_bytes = recv.read_to_end(MAX_MESSAGE_SIZE).await.map_err(|e| {
                tracing::error!("failed to read message from {}: {}", remote, e);
                AcceptError::from(std::io::Error::other(e))
            })?;

            let message: Message = bincode::deserialize(&message_bytes).map_err(|e| {
                tracing::warn!("failed to deserialize message from {}: {}", remote, e);
                accept_error(format!("failed to deserialize message: {e}"))
            })?;

            let reply = ursula.handle(message);
            tracing::debug!("replying {} to {}", reply.kind(), remote);

            let reply_bytes = bincode::serialize(&reply).map_err(|e| {
                tracing::error!("failed to serialize reply: {}", e);
                accept_error(format!("failed to serialize reply: {e}"))
            })?;

            send.write_all(&reply_bytes).await.map_err(|e| {
                tracing::error!("failed to send reply: {}", e);
                AcceptError::from(std::io::Error::other(e))
            })?;
            send.finish().map_err(|e| {
                tracing::error!("failed to finish stream: {}", e);
                AcceptError::from(std::io::Error::other(e))
            })?;

            // the requester closes once it has read the reply
            conn.closed().await;
            Ok(())
        })
    }
}
