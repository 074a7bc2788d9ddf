//! Integration tests for granting policies

mod common;

use std::time::Duration;

use ::common::characters::CanSign;
use ::common::error::{ErrorCategory, FailureReason, ProtocolError};
use ::common::testkit::{NodeBehavior, TestNetwork};

#[tokio::test]
async fn test_grant_places_every_fragment() {
    let net = TestNetwork::with_ursulas(5);
    let (alice, bob, policy) = common::grant(&net, 2, 3).await.unwrap();

    assert_eq!(policy.destinations.len(), 3);
    let mut holders = net.holders(&policy.policy.hrac);
    holders.sort();
    assert_eq!(holders, policy.destinations.keys().copied().collect::<Vec<_>>());

    // the lowest node ids are offered first
    assert_eq!(holders, net.ids()[..3].to_vec());

    let map = bob
        .join_policy("test", &alice.stamp(), Some(policy.treasure_map))
        .await
        .unwrap();
    assert_eq!(map.threshold(), 2);
    assert_eq!(map.destinations(), &policy.destinations);
}

#[tokio::test]
async fn test_grant_falls_back_when_a_node_is_offline() {
    let net = TestNetwork::with_ursulas(4);
    let ids = net.ids();
    net.set_offline(&ids[0], true);

    let (_, _, policy) = common::grant(&net, 2, 3).await.unwrap();
    assert!(!policy.destinations.contains_key(&ids[0]));
    assert_eq!(
        policy.destinations.keys().copied().collect::<Vec<_>>(),
        ids[1..].to_vec()
    );
}

#[tokio::test]
async fn test_grant_falls_back_when_a_node_rejects() {
    let net = TestNetwork::with_ursulas(4);
    let ids = net.ids();
    net.set_rejecting(&ids[1], true);

    let (_, _, policy) = common::grant(&net, 3, 3).await.unwrap();
    assert!(!policy.destinations.contains_key(&ids[1]));
    assert_eq!(net.holders(&policy.policy.hrac).len(), 3);
}

#[tokio::test]
async fn test_grant_falls_back_when_a_node_is_slow() {
    let net = TestNetwork::with_ursulas(4);
    let ids = net.ids();
    net.set_behavior(&ids[2], NodeBehavior::Slow(Duration::from_secs(2)));

    let (_, _, policy) = common::grant(&net, 2, 3).await.unwrap();
    assert!(!policy.destinations.contains_key(&ids[2]));
    assert!(!net.holders(&policy.policy.hrac).contains(&ids[2]));
}

#[tokio::test]
async fn test_lost_acceptance_is_revoked() {
    let net = TestNetwork::with_ursulas(4);
    let ids = net.ids();
    net.set_behavior(&ids[0], NodeBehavior::LosesReplies);

    let (_, _, policy) = common::grant(&net, 2, 3).await.unwrap();
    assert!(!policy.destinations.contains_key(&ids[0]));
    let mut holders = net.holders(&policy.policy.hrac);
    holders.sort();
    assert_eq!(holders, ids[1..].to_vec());
}

#[tokio::test]
async fn test_enactment_failure_leaves_no_fragments() {
    let net = TestNetwork::with_ursulas(3);
    let ids = net.ids();
    net.set_offline(&ids[2], true);

    let alice = net.alice();
    let bob = net.bob();
    let params = common::params(&bob, "test", 2, 3);
    let hrac = alice.create_policy(&params).unwrap().hrac;

    let err = alice.grant(&params).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Negotiation);
    match err {
        ProtocolError::EnactmentFailure {
            required, failures, ..
        } => {
            assert_eq!(required, 3);
            assert!(failures
                .iter()
                .any(|f| f.node == ids[2] && matches!(f.reason, FailureReason::Unreachable(_))));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(net.holders(&hrac).is_empty());
    assert!(alice.enacted_policy(&params.bob_encrypting_key, "test").is_none());
}

#[tokio::test]
async fn test_too_few_candidates_sends_nothing() {
    let net = TestNetwork::with_ursulas(2);
    let err = common::grant(&net, 2, 3).await.unwrap_err();

    assert!(matches!(
        err,
        ProtocolError::EnactmentFailure {
            accepted: 0,
            required: 3,
            ..
        }
    ));
    assert_eq!(net.transport().requests(), 0);
}

#[tokio::test]
async fn test_invalid_parameters_are_input_errors() {
    let net = TestNetwork::with_ursulas(3);
    let alice = net.alice();
    let bob = net.bob();

    for (m, n) in [(0, 3), (4, 3), (1, 256)] {
        let err = alice
            .grant(&common::params(&bob, "test", m, n))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Input, "{m}-of-{n}");
    }

    let mut expired = common::params(&bob, "test", 1, 1);
    expired.expiration = Some(1);
    let err = alice.grant(&expired).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Expired(1)));

    assert_eq!(net.transport().requests(), 0);
}
