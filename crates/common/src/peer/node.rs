use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use iroh::discovery::pkarr::dht::DhtDiscovery;
use iroh::Endpoint;

use super::{IrohTransport, NodeMetadata};
use crate::crypto::{PublicKey, SecretKey};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("only IPv4 bind addresses are supported, got {0}")]
    UnsupportedAddress(SocketAddr),
    #[error("failed to set up discovery: {0}")]
    Discovery(String),
    #[error("failed to bind endpoint: {0}")]
    Bind(String),
}

#[derive(Clone, Default)]
pub struct NodeBuilder {
    /// the socket addr to expose the node on
    ///  if not set, an ephemeral port will be used
    socket_address: Option<SocketAddr>,
    /// the identity of the node
    secret_key: Option<SecretKey>,
    /// addresses to publish in our metadata instead of the bound sockets
    advertised: Vec<SocketAddr>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn socket_address(mut self, socket_addr: SocketAddr) -> Self {
        self.socket_address = Some(socket_addr);
        self
    }

    pub fn secret_key(mut self, secret_key: SecretKey) -> Self {
        self.secret_key = Some(secret_key);
        self
    }

    pub fn advertise(mut self, addresses: Vec<SocketAddr>) -> Self {
        self.advertised = addresses;
        self
    }

    pub async fn build(self) -> Result<Node, NodeError> {
        let socket_addr = self
            .socket_address
            .unwrap_or_else(|| SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0));
        let secret_key = self.secret_key.unwrap_or_else(SecretKey::generate);

        let addr = match socket_addr.ip() {
            IpAddr::V4(ip) => SocketAddrV4::new(ip, socket_addr.port()),
            IpAddr::V6(_) => return Err(NodeError::UnsupportedAddress(socket_addr)),
        };

        let mainline_discovery = DhtDiscovery::builder()
            .secret_key(secret_key.0.clone())
            .build()
            .map_err(|e| NodeError::Discovery(e.to_string()))?;

        let endpoint = Endpoint::builder()
            .secret_key(secret_key.0.clone())
            .discovery(mainline_discovery)
            .bind_addr_v4(addr)
            .bind()
            .await
            .map_err(|e| NodeError::Bind(e.to_string()))?;

        Ok(Node {
            socket_address: socket_addr,
            secret_key,
            endpoint,
            advertised: self.advertised,
        })
    }
}

/// A bound iroh endpoint plus the identity it runs under.
#[derive(Debug, Clone)]
pub struct Node {
    socket_address: SocketAddr,
    secret_key: SecretKey,
    endpoint: Endpoint,
    advertised: Vec<SocketAddr>,
}

impl Node {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn socket(&self) -> &SocketAddr {
        &self.socket_address
    }

    pub fn id(&self) -> PublicKey {
        self.secret_key.public()
    }

    pub fn transport(&self) -> IrohTransport {
        IrohTransport::new(self.endpoint.clone())
    }

    /// Freshly signed metadata describing how to reach this node. Wildcard
    /// bind addresses are published as loopback.
    pub fn metadata(&self) -> NodeMetadata {
        let addresses = if self.advertised.is_empty() {
            self.endpoint
                .bound_sockets()
                .into_iter()
                .map(|mut addr| {
                    if addr.ip().is_unspecified() {
                        addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
                    }
                    addr
                })
                .collect()
        } else {
            self.advertised.clone()
        };
        NodeMetadata::new(&self.secret_key, addresses, None)
    }
}
