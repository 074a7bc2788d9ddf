use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{select_ok, try_join_all};
use futures::FutureExt;
use parking_lot::RwLock;

use super::powers::{CanDecrypt, CanSign};
use super::ursula::unix_now;
use crate::crypto::{DecryptingKey, EncryptingKey, PublicKey, SecretKey};
use crate::discovery::NodeDiscovery;
use crate::error::ProtocolError;
use crate::peer::{Message, Reply, Transport};
use crate::policy::{EncryptedTreasureMap, Hrac, MessageKit, VerifiedTreasureMap};
use crate::retrieval::{Recipient, RetrievalConfig, RetrievalCoordinator};

/// The delegatee: joins policies and retrieves what Enrico encrypted.
pub struct Bob {
    signer: SecretKey,
    decrypting: DecryptingKey,
    transport: Arc<dyn Transport>,
    discovery: Arc<dyn NodeDiscovery>,
    coordinator: RetrievalCoordinator,
    fetch_timeout: Duration,
    joined: RwLock<HashMap<(PublicKey, String), VerifiedTreasureMap>>,
}

impl std::fmt::Debug for Bob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bob")
            .field("stamp", &self.stamp())
            .field("joined", &self.joined.read().len())
            .finish()
    }
}

impl CanSign for Bob {
    fn signing_key(&self) -> &SecretKey {
        &self.signer
    }
}

impl CanDecrypt for Bob {
    fn decrypting_key(&self) -> &DecryptingKey {
        &self.decrypting
    }
}

impl Bob {
    pub fn new(
        signer: SecretKey,
        decrypting: DecryptingKey,
        transport: Arc<dyn Transport>,
        discovery: Arc<dyn NodeDiscovery>,
        config: RetrievalConfig,
    ) -> Self {
        let fetch_timeout = config.request_timeout;
        let coordinator = RetrievalCoordinator::new(transport.clone(), discovery.clone(), config);
        Self {
            signer,
            decrypting,
            transport,
            discovery,
            coordinator,
            fetch_timeout,
            joined: RwLock::new(HashMap::new()),
        }
    }

    /// Decrypt and verify the treasure map of Alice's policy for `label`.
    /// Without a map at hand it is fetched from the known nodes.
    pub async fn join_policy(
        &self,
        label: &str,
        alice: &PublicKey,
        treasure_map: Option<EncryptedTreasureMap>,
    ) -> Result<VerifiedTreasureMap, ProtocolError> {
        let hrac = Hrac::derive(alice, &self.encrypting_key(), label.as_bytes());
        let map = match treasure_map {
            Some(encrypted) => self.open_treasure_map(&encrypted, &hrac, alice)?,
            None => self.fetch_treasure_map(&hrac, alice).await?,
        };
        tracing::info!(
            "joined policy {} ({} destinations)",
            hrac,
            map.destinations().len()
        );
        self.joined
            .write()
            .insert((*alice, label.to_string()), map.clone());
        Ok(map)
    }

    fn open_treasure_map(
        &self,
        encrypted: &EncryptedTreasureMap,
        hrac: &Hrac,
        alice: &PublicKey,
    ) -> Result<VerifiedTreasureMap, ProtocolError> {
        let map = encrypted.decrypt(&self.decrypting)?;
        if map.hrac() != hrac {
            return Err(ProtocolError::VerificationFailure(format!(
                "treasure map is for policy {}, not {}",
                map.hrac(),
                hrac
            )));
        }
        Ok(map.into_verified(alice)?)
    }

    /// Ask every known node for the map and keep the first one that opens
    /// and verifies. A node serving a map Alice did not sign is skipped.
    async fn fetch_treasure_map(
        &self,
        hrac: &Hrac,
        alice: &PublicKey,
    ) -> Result<VerifiedTreasureMap, ProtocolError> {
        let nodes = self.discovery.known_nodes();
        if nodes.is_empty() {
            return Err(ProtocolError::UnknownPolicy(hrac.to_hex()));
        }
        let fetches = nodes.into_iter().map(|metadata| {
            async move {
                let request = self
                    .transport
                    .send(&metadata, Message::FetchTreasureMap(*hrac));
                match tokio::time::timeout(self.fetch_timeout, request).await {
                    Ok(Ok(Reply::TreasureMap(map))) => self
                        .open_treasure_map(&map, hrac, alice)
                        .map_err(|e| {
                            tracing::warn!(
                                "{} served an invalid treasure map for {}: {}",
                                metadata.node(),
                                hrac,
                                e
                            );
                        }),
                    _ => Err(()),
                }
            }
            .boxed()
        });
        match select_ok(fetches).await {
            Ok((map, _)) => Ok(map),
            Err(()) => {
                tracing::warn!("no known node has a valid treasure map for {}", hrac);
                Err(ProtocolError::UnknownPolicy(hrac.to_hex()))
            }
        }
    }

    pub fn joined_policy(&self, label: &str, alice: &PublicKey) -> Option<VerifiedTreasureMap> {
        self.joined
            .read()
            .get(&(*alice, label.to_string()))
            .cloned()
    }

    /// Open each kit through the policy's Ursulas. Plaintexts come back in
    /// the order of `kits`; any failure fails the call.
    pub async fn retrieve(
        &self,
        label: &str,
        alice: &PublicKey,
        policy_key: &EncryptingKey,
        data_source: &PublicKey,
        kits: &[MessageKit],
    ) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let map = match self.joined_policy(label, alice) {
            Some(map) => map,
            None => self.join_policy(label, alice, None).await?,
        };
        if let Some(expiration) = map.expiration() {
            if expiration <= unix_now() {
                return Err(ProtocolError::Expired(expiration));
            }
        }

        let recipient = Recipient {
            signer: &self.signer,
            decrypting: &self.decrypting,
        };
        let plaintexts = try_join_all(kits.iter().map(|kit| {
            self.coordinator
                .retrieve(&map, kit, data_source, policy_key, recipient)
        }))
        .await?;
        tracing::info!("retrieved {} messages from policy {}", plaintexts.len(), map.hrac());
        Ok(plaintexts)
    }
}
