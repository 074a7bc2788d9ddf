use async_trait::async_trait;
use iroh::Endpoint;

use super::messages::{Message, Reply};
use super::{NodeMetadata, ALPN, MAX_MESSAGE_SIZE};
use crate::crypto::PublicKey;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {node}: {reason}")]
    Connect { node: PublicKey, reason: String },
    #[error("stream error with {node}: {reason}")]
    Stream { node: PublicKey, reason: String },
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("node {0} is offline")]
    Offline(PublicKey),
}

/// One request, one reply, to a node described by its metadata.
///
/// Coordinators only see this trait, so protocol tests can run over an
/// in-process transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, node: &NodeMetadata, message: Message) -> Result<Reply, TransportError>;
}

/// [`Transport`] over iroh QUIC: one connection and one bidirectional
/// stream per request.
#[derive(Debug, Clone)]
pub struct IrohTransport {
    endpoint: Endpoint,
}

impl IrohTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Transport for IrohTransport {
    async fn send(&self, node: &NodeMetadata, message: Message) -> Result<Reply, TransportError> {
        let id = *node.node();
        let stream_error = |e: &dyn std::fmt::Display| TransportError::Stream {
            node: id,
            reason: e.to_string(),
        };

        let conn = self
            .endpoint
            .connect(node.node_addr(), ALPN)
            .await
            .map_err(|e| {
                tracing::debug!("failed to connect to node {}: {}", id, e);
                TransportError::Connect {
                    node: id,
                    reason: e.to_string(),
                }
            })?;

        let (mut send, mut recv) = conn.open_bi().await.map_err(|e| stream_error(&e))?;

        let request_bytes = bincode::serialize(&message)?;
        tracing::trace!("sending {} byte request to {}", request_bytes.len(), id);

        send.write_all(&request_bytes)
            .await
            .map_err(|e| stream_error(&e))?;
        send.finish().map_err(|e| stream_error(&e))?;

        let reply_bytes = recv
            .read_to_end(MAX_MESSAGE_SIZE)
            .await
            .map_err(|e| stream_error(&e))?;

        let reply: Reply = bincode::deserialize(&reply_bytes)?;
        tracing::trace!("received {} reply from {}", reply.kind(), id);

        conn.close(0u32.into(), b"done");
        Ok(reply)
    }
}
