//! Integration tests for threshold retrieval

mod common;

use std::time::Duration;

use ::common::characters::{CanSign, Enrico};
use ::common::discovery::NodeDiscovery;
use ::common::error::{ErrorCategory, FailureReason, ProtocolError};
use ::common::testkit::{NodeBehavior, TestNetwork};

#[tokio::test]
async fn test_one_destination_down_still_decrypts() {
    let net = TestNetwork::with_ursulas(3);
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();
    let enrico = Enrico::ephemeral(policy.policy.policy_key);
    let kit = enrico.encrypt_message(b"two of three").unwrap();

    let down = *policy.destinations.keys().next().unwrap();
    net.set_offline(&down, true);

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
    assert_eq!(plaintexts, vec![b"two of three".to_vec()]);
}

#[tokio::test]
async fn test_two_destinations_down_fails_then_recovers() {
    let net = TestNetwork::with_ursulas(3);
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();
    bob.join_policy("test", &alice.stamp(), Some(policy.treasure_map.clone()))
        .await
        .unwrap();
    let enrico = Enrico::ephemeral(policy.policy.policy_key);
    let kit = enrico.encrypt_message(b"wait for it").unwrap();

    let down: Vec<_> = policy.destinations.keys().take(2).copied().collect();
    for node in &down {
        net.set_offline(node, true);
    }

    let err = bob
        .retrieve(
            "test",
            &alice.stamp(),
            &policy.policy.policy_key,
            &enrico.data_source(),
            std::slice::from_ref(&kit),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Retrieval);
    match &err {
        ProtocolError::InsufficientFragments {
            collected,
            required,
            failures,
        } => {
            assert_eq!((*collected, *required), (1, 2));
            assert_eq!(failures.len(), 2);
            for failure in failures {
                assert!(down.contains(&failure.node));
                assert!(matches!(failure.reason, FailureReason::Unreachable(_)));
            }
        }
        other => panic!("unexpected error {other:?}"),
    }

    for node in &down {
        net.set_offline(node, false);
    }
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
    assert_eq!(plaintexts, vec![b"wait for it".to_vec()]);
}

#[tokio::test]
async fn test_crashed_request_is_reported_as_a_failure() {
    let net = TestNetwork::with_ursulas(2);
    let (alice, bob, policy) = common::grant(&net, 2, 2).await.unwrap();
    bob.join_policy("test", &alice.stamp(), Some(policy.treasure_map.clone()))
        .await
        .unwrap();
    let enrico = Enrico::ephemeral(policy.policy.policy_key);
    let kit = enrico.encrypt_message(b"never opened").unwrap();

    let crashed = *policy.destinations.keys().next().unwrap();
    net.set_behavior(&crashed, NodeBehavior::Crashes);

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
    match err {
        ProtocolError::InsufficientFragments {
            collected,
            required,
            failures,
        } => {
            assert_eq!((collected, required), (1, 2));
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].node, crashed);
            assert!(matches!(failures[0].reason, FailureReason::Unreachable(_)));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_destination_is_replaced() {
    let net = TestNetwork::with_ursulas(4);
    let (alice, bob, policy) = common::grant(&net, 2, 4).await.unwrap();
    let enrico = Enrico::ephemeral(policy.policy.policy_key);
    let kit = enrico.encrypt_message(b"patience").unwrap();

    for node in policy.destinations.keys().take(2) {
        net.set_behavior(node, NodeBehavior::Slow(Duration::from_secs(3)));
    }

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
    assert_eq!(plaintexts, vec![b"patience".to_vec()]);
}

#[tokio::test]
async fn test_kits_come_back_in_input_order() {
    let net = TestNetwork::with_ursulas(3);
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();
    let enrico = Enrico::ephemeral(policy.policy.policy_key);

    let messages: Vec<Vec<u8>> = (0..5).map(|i| format!("message {i}").into_bytes()).collect();
    let kits: Vec<_> = messages
        .iter()
        .map(|message| enrico.encrypt_message(message).unwrap())
        .collect();

    let plaintexts = bob
        .retrieve(
            "test",
            &alice.stamp(),
            &policy.policy.policy_key,
            &enrico.data_source(),
            &kits,
        )
        .await
        .unwrap();
    assert_eq!(plaintexts, messages);
}

#[tokio::test]
async fn test_wrong_data_source_is_rejected_before_any_request() {
    let net = TestNetwork::with_ursulas(3);
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();
    bob.join_policy("test", &alice.stamp(), Some(policy.treasure_map.clone()))
        .await
        .unwrap();
    let kit = Enrico::ephemeral(policy.policy.policy_key)
        .encrypt_message(b"forged?")
        .unwrap();
    let impostor = Enrico::ephemeral(policy.policy.policy_key);

    let before = net.transport().requests();
    let err = bob
        .retrieve(
            "test",
            &alice.stamp(),
            &policy.policy.policy_key,
            &impostor.data_source(),
            &[kit],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::BadDataSource));
    assert_eq!(err.category(), ErrorCategory::Integrity);
    assert_eq!(net.transport().requests(), before);
}

#[tokio::test]
async fn test_bob_learns_destinations_from_a_teacher() {
    let net = TestNetwork::with_ursulas(3);
    let alice = net.alice();
    let registry = net.registry_taught_by(0);
    let bob = net.bob_with(registry.clone());
    let policy = alice
        .grant(&common::params(&bob, "test", 2, 3))
        .await
        .unwrap();
    assert_eq!(registry.known_nodes().len(), 1);

    let enrico = Enrico::ephemeral(policy.policy.policy_key);
    let kit = enrico.encrypt_message(b"taught").unwrap();
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
    assert_eq!(plaintexts, vec![b"taught".to_vec()]);
    assert!(registry.known_nodes().len() >= 2);
}
