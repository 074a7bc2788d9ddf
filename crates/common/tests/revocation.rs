//! Integration tests for revoking policies

mod common;

use ::common::characters::{CanDecrypt, CanSign, Enrico};
use ::common::error::{ErrorCategory, ProtocolError};
use ::common::testkit::TestNetwork;

#[tokio::test]
async fn test_revoked_policy_cannot_be_reencrypted() {
    let net = TestNetwork::with_ursulas(3);
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();
    bob.join_policy("test", &alice.stamp(), Some(policy.treasure_map.clone()))
        .await
        .unwrap();
    let enrico = Enrico::ephemeral(policy.policy.policy_key);
    let kit = enrico.encrypt_message(b"soon gone").unwrap();

    let mut revoked = alice.revoke(&bob.encrypting_key(), "test").await.unwrap();
    revoked.sort();
    assert_eq!(revoked, policy.destinations.keys().copied().collect::<Vec<_>>());
    assert!(net.holders(&policy.policy.hrac).is_empty());

    let err = bob
        .retrieve(
            "test",
            &alice.stamp(),
            &policy.policy.policy_key,
            &enrico.data_source(),
            &[kit],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::InsufficientFragments { collected: 0, .. }
    ));
}

#[tokio::test]
async fn test_revoking_twice_is_an_unknown_policy() {
    let net = TestNetwork::with_ursulas(2);
    let (alice, bob, _) = common::grant(&net, 1, 2).await.unwrap();

    alice.revoke(&bob.encrypting_key(), "test").await.unwrap();
    let err = alice
        .revoke(&bob.encrypting_key(), "test")
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownPolicy(_)));
    assert_eq!(err.category(), ErrorCategory::Input);
}

#[tokio::test]
async fn test_revocation_reaches_only_reachable_nodes() {
    let net = TestNetwork::with_ursulas(3);
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();
    let offline = *policy.destinations.keys().next().unwrap();
    net.set_offline(&offline, true);

    let revoked = alice.revoke(&bob.encrypting_key(), "test").await.unwrap();
    assert_eq!(revoked.len(), 2);
    assert!(!revoked.contains(&offline));
    assert_eq!(net.holders(&policy.policy.hrac), vec![offline]);
}
