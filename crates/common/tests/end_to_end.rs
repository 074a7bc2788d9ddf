//! Alice grants, Enrico encrypts, Bob decrypts

mod common;

use std::time::Duration;

use ::common::characters::{CanDecrypt, CanSign, Enrico};
use ::common::crypto::{DecryptingKey, SecretKey};
use ::common::peer::{Message, Reply, TreasureMapPublication};
use ::common::policy::{
    split, ArrangementProposal, MessageKit, PolicyTerms, RekeyMaterial, TreasureMap,
};
use ::common::testkit::{NodeBehavior, TestNetwork};

#[tokio::test]
async fn test_hello_one_of_one() {
    let net = TestNetwork::with_ursulas(1);
    let (alice, bob, policy) = common::grant(&net, 1, 1).await.unwrap();

    let enrico = Enrico::ephemeral(policy.policy.policy_key);
    let kit = enrico.encrypt_message(b"hello").unwrap();

    bob.join_policy("test", &alice.stamp(), Some(policy.treasure_map))
        .await
        .unwrap();
    let plaintexts = bob
        .retrieve(
            "test",
            &alice.stamp(),
            &policy.policy.policy_key,
            &enrico.data_source(),
            &[kit],
        )
        .await
        .unwrap();
    assert_eq!(plaintexts, vec![b"hello".to_vec()]);
}

#[tokio::test]
async fn test_enrico_encrypts_before_the_grant() {
    let net = TestNetwork::with_ursulas(5);
    let alice = net.alice();
    let bob = net.bob();

    // the policy key exists as soon as the label does
    let policy_key = alice.derive_policy_pubkey("diary");
    let enrico = Enrico::ephemeral(policy_key);
    let kit = enrico.encrypt_message(b"dear diary").unwrap();
    // kits travel as base64 text
    let kit = MessageKit::from_base64(&kit.to_base64()).unwrap();

    let policy = alice
        .grant(&common::params(&bob, "diary", 3, 5))
        .await
        .unwrap();
    assert_eq!(policy.policy.policy_key, policy_key);

    // no map handed over: bob fetches it from the policy's nodes
    let plaintexts = bob
        .retrieve(
            "diary",
            &alice.stamp(),
            &policy_key,
            &enrico.data_source(),
            &[kit],
        )
        .await
        .unwrap();
    assert_eq!(plaintexts, vec![b"dear diary".to_vec()]);
}

#[tokio::test]
async fn test_another_bob_cannot_use_the_map() {
    let net = TestNetwork::with_ursulas(3);
    let (alice, _, policy) = common::grant(&net, 2, 3).await.unwrap();
    let eve = net.bob();

    assert!(eve
        .join_policy("test", &alice.stamp(), Some(policy.treasure_map))
        .await
        .is_err());
}

#[tokio::test]
async fn test_forged_map_on_one_node_is_skipped() {
    let net = TestNetwork::with_ursulas(4);
    let ids = net.ids();
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();
    let hrac = policy.policy.hrac;
    let outsider = ids
        .into_iter()
        .find(|id| !policy.destinations.contains_key(id))
        .unwrap();

    // Mallory plants her own fragment and map under Alice's hrac on the
    // one node that does not hold Alice's policy
    let mallory = SecretKey::generate();
    let mallory_policy = DecryptingKey::generate();
    let terms = PolicyTerms {
        hrac,
        publisher: mallory.public(),
        policy_key: mallory_policy.public(),
        bob_encrypting_key: bob.encrypting_key(),
        bob_signing_key: bob.stamp(),
        expiration: None,
    };
    let kfrag = split(
        RekeyMaterial {
            delegating: &mallory_policy,
            receiving: &bob.encrypting_key(),
        },
        1,
        1,
    )
    .unwrap()
    .remove(0);
    let ursula = net.ursula(&outsider).unwrap();
    let proposal = ArrangementProposal::new(terms, &kfrag, &outsider, &mallory).unwrap();
    assert!(matches!(
        ursula.handle(Message::ProposeArrangement(proposal)),
        Reply::ArrangementAccepted(_)
    ));
    let forged = TreasureMap::build(hrac, 1, [(outsider, kfrag.id())], None, &mallory)
        .unwrap()
        .encrypt(&bob.encrypting_key())
        .unwrap();
    assert_eq!(
        ursula.handle(Message::PublishTreasureMap(TreasureMapPublication::new(
            hrac, forged, &mallory
        ))),
        Reply::TreasureMapStored
    );

    // the forged map arrives first; Bob still ends up with Alice's
    for node in policy.destinations.keys() {
        net.set_behavior(node, NodeBehavior::Slow(Duration::from_millis(100)));
    }
    let map = bob.join_policy("test", &alice.stamp(), None).await.unwrap();
    assert_eq!(map.destinations(), &policy.destinations);
    assert_eq!(map.publisher(), &alice.stamp());
}
