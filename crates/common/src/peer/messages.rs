use serde::{Deserialize, Serialize};

use super::NodeMetadata;
use crate::crypto::{Capsule, CapsuleFrag, KFragId, PublicKey, SecretKey, Signature};
use crate::policy::{
    ArrangementAck, ArrangementProposal, EncryptedTreasureMap, Hrac, RevocationOrder,
};

const REENCRYPTION_DOMAIN: &[u8] = b"trove/reencryption-request";
const PUBLICATION_DOMAIN: &[u8] = b"trove/treasure-map-publication";

/// Top-level request enum of the node protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Offer a key fragment
    ProposeArrangement(ArrangementProposal),
    /// Drop a previously accepted key fragment
    RevokeArrangement(RevocationOrder),
    /// Re-encrypt one capsule with one held fragment
    Reencrypt(ReencryptionRequest),
    /// Store the encrypted treasure map of a policy this node serves
    PublishTreasureMap(TreasureMapPublication),
    /// Ask for the encrypted treasure map of a policy
    FetchTreasureMap(Hrac),
    /// Ask for the signed metadata of another node
    LearnAbout(PublicKey),
}

/// Top-level response enum of the node protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    ArrangementAccepted(ArrangementAck),
    ArrangementRevoked,
    CapsuleFrag(CapsuleFrag),
    TreasureMapStored,
    TreasureMap(EncryptedTreasureMap),
    NodeMetadata(NodeMetadata),
    /// The node understood the request and declined it.
    Refused(String),
}

impl Reply {
    pub fn refused(reason: impl Into<String>) -> Self {
        Reply::Refused(reason.into())
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::ArrangementAccepted(_) => "arrangement_accepted",
            Reply::ArrangementRevoked => "arrangement_revoked",
            Reply::CapsuleFrag(_) => "capsule_frag",
            Reply::TreasureMapStored => "treasure_map_stored",
            Reply::TreasureMap(_) => "treasure_map",
            Reply::NodeMetadata(_) => "node_metadata",
            Reply::Refused(_) => "refused",
        }
    }
}

/// Bob's signed request for one capsule fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReencryptionRequest {
    pub hrac: Hrac,
    pub kfrag_id: KFragId,
    pub capsule: Capsule,
    pub signature: Signature,
}

fn reencryption_message(hrac: &Hrac, kfrag_id: &KFragId, capsule: &Capsule) -> Vec<u8> {
    let mut message = REENCRYPTION_DOMAIN.to_vec();
    message.extend_from_slice(hrac.as_bytes());
    message.extend_from_slice(&kfrag_id.0);
    message.extend_from_slice(&capsule.to_bytes());
    message
}

impl ReencryptionRequest {
    pub fn new(hrac: Hrac, kfrag_id: KFragId, capsule: Capsule, bob: &SecretKey) -> Self {
        let signature = bob.sign(&reencryption_message(&hrac, &kfrag_id, &capsule));
        Self {
            hrac,
            kfrag_id,
            capsule,
            signature,
        }
    }

    pub fn verify(&self, bob: &PublicKey) -> bool {
        bob.is_valid_signature(
            &reencryption_message(&self.hrac, &self.kfrag_id, &self.capsule),
            &self.signature,
        )
    }
}

/// Alice's signed publication of a policy's encrypted treasure map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreasureMapPublication {
    pub hrac: Hrac,
    pub map: EncryptedTreasureMap,
    pub signature: Signature,
}

fn publication_message(hrac: &Hrac, map: &EncryptedTreasureMap) -> Vec<u8> {
    let mut message = PUBLICATION_DOMAIN.to_vec();
    message.extend_from_slice(hrac.as_bytes());
    message.extend_from_slice(&map.to_bytes());
    message
}

impl TreasureMapPublication {
    pub fn new(hrac: Hrac, map: EncryptedTreasureMap, publisher: &SecretKey) -> Self {
        let signature = publisher.sign(&publication_message(&hrac, &map));
        Self {
            hrac,
            map,
            signature,
        }
    }

    pub fn verify(&self, publisher: &PublicKey) -> bool {
        publisher.is_valid_signature(&publication_message(&self.hrac, &self.map), &self.signature)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::DecryptingKey;

    #[test]
    fn test_message_wire_encoding() {
        let bob = SecretKey::generate();
        let (capsule, _) = crate::crypto::pre::encrypt(&DecryptingKey::generate().public(), b"x")
            .unwrap();
        let hrac = Hrac::from_bytes([1; 16]);
        let request = ReencryptionRequest::new(hrac, KFragId([2; 32]), capsule.clone(), &bob);

        let bytes = bincode::serialize(&Message::Reencrypt(request)).unwrap();
        match bincode::deserialize::<Message>(&bytes).unwrap() {
            Message::Reencrypt(decoded) => {
                assert_eq!(decoded.hrac, hrac);
                assert_eq!(decoded.capsule, capsule);
                assert!(decoded.verify(&bob.public()));
                assert!(!decoded.verify(&SecretKey::generate().public()));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
