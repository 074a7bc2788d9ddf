use std::net::SocketAddr;

use base64::Engine;
use iroh::{NodeAddr, RelayUrl};
use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, SecretKey, Signature};

const METADATA_DOMAIN: &[u8] = b"trove/node-metadata";

/// How to reach a node, signed by the node itself.
///
/// Teachers hand these out on learn-about requests; since the signature is
/// by the node's own identity key, a teacher can withhold metadata but not
/// forge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    node: PublicKey,
    addresses: Vec<SocketAddr>,
    relay_url: Option<String>,
    timestamp: u64,
    signature: Signature,
}

fn signed_bytes(
    node: &PublicKey,
    addresses: &[SocketAddr],
    relay_url: Option<&str>,
    timestamp: u64,
) -> Vec<u8> {
    let mut out = METADATA_DOMAIN.to_vec();
    out.extend_from_slice(node.as_bytes());
    out.extend_from_slice(&(addresses.len() as u32).to_be_bytes());
    for address in addresses {
        let address = address.to_string();
        out.extend_from_slice(&(address.len() as u32).to_be_bytes());
        out.extend_from_slice(address.as_bytes());
    }
    match relay_url {
        Some(relay_url) => {
            out.push(1);
            out.extend_from_slice(&(relay_url.len() as u32).to_be_bytes());
            out.extend_from_slice(relay_url.as_bytes());
        }
        None => out.push(0),
    }
    out.extend_from_slice(&timestamp.to_be_bytes());
    out
}

impl NodeMetadata {
    pub fn new(signer: &SecretKey, addresses: Vec<SocketAddr>, relay_url: Option<String>) -> Self {
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        Self::with_timestamp(signer, addresses, relay_url, timestamp)
    }

    pub fn with_timestamp(
        signer: &SecretKey,
        addresses: Vec<SocketAddr>,
        relay_url: Option<String>,
        timestamp: u64,
    ) -> Self {
        let node = signer.public();
        let signature = signer.sign(&signed_bytes(
            &node,
            &addresses,
            relay_url.as_deref(),
            timestamp,
        ));
        Self {
            node,
            addresses,
            relay_url,
            timestamp,
            signature,
        }
    }

    pub fn node(&self) -> &PublicKey {
        &self.node
    }

    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    pub fn relay_url(&self) -> Option<&str> {
        self.relay_url.as_deref()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Whether the metadata was signed by the node it describes.
    pub fn verify(&self) -> bool {
        let message = signed_bytes(
            &self.node,
            &self.addresses,
            self.relay_url.as_deref(),
            self.timestamp,
        );
        self.node.is_valid_signature(&message, &self.signature)
    }

    /// Dialing information for the iroh endpoint. An unparsable relay url is
    /// ignored in favour of the direct addresses.
    pub fn node_addr(&self) -> NodeAddr {
        let relay_url = self
            .relay_url
            .as_deref()
            .and_then(|url| url.parse::<RelayUrl>().ok());
        NodeAddr::from_parts(*self.node, relay_url, self.addresses.iter().copied())
    }

    /// Printable form handed to operators so other nodes can use this one
    /// as a teacher.
    pub fn to_base64(&self) -> String {
        let bytes = bincode::serialize(self).unwrap_or_default();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    /// Parse a card produced by [`NodeMetadata::to_base64`]. The signature
    /// is checked here.
    pub fn from_base64(encoded: &str) -> Result<Self, MetadataError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| MetadataError::Malformed(e.to_string()))?;
        let metadata: Self =
            bincode::deserialize(&bytes).map_err(|e| MetadataError::Malformed(e.to_string()))?;
        if !metadata.verify() {
            return Err(MetadataError::BadSignature(metadata.node));
        }
        Ok(metadata)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("malformed node card: {0}")]
    Malformed(String),
    #[error("node card for {0} is not signed by that node")]
    BadSignature(PublicKey),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_self_signed_metadata() {
        let node = SecretKey::generate();
        let addr: SocketAddr = "127.0.0.1:4444".parse().unwrap();
        let metadata = NodeMetadata::new(&node, vec![addr], None);
        assert!(metadata.verify());
        assert_eq!(metadata.node(), &node.public());
        assert_eq!(metadata.node_addr().node_id, *node.public());

        let mut forged = metadata.clone();
        forged.addresses = vec!["10.0.0.1:4444".parse().unwrap()];
        assert!(!forged.verify());

        let mut impostor = metadata;
        impostor.node = SecretKey::generate().public();
        assert!(!impostor.verify());
    }

    #[test]
    fn test_node_card() {
        let node = SecretKey::generate();
        let addr: SocketAddr = "127.0.0.1:4444".parse().unwrap();
        let metadata = NodeMetadata::new(&node, vec![addr], None);

        let card = metadata.to_base64();
        assert_eq!(NodeMetadata::from_base64(&card).unwrap(), metadata);

        let mut forged = metadata;
        forged.timestamp += 1;
        assert!(matches!(
            NodeMetadata::from_base64(&forged.to_base64()),
            Err(MetadataError::BadSignature(_))
        ));
        assert!(NodeMetadata::from_base64("not a card").is_err());
    }
}
