//! Shared helpers for protocol integration tests
#![allow(dead_code)]

use common::characters::{Alice, Bob, CanDecrypt, CanSign, PolicyParams};
use common::error::ProtocolError;
use common::policy::EnactedPolicy;
use common::testkit::TestNetwork;

pub fn params(bob: &Bob, label: &str, m: usize, n: usize) -> PolicyParams {
    PolicyParams {
        bob_encrypting_key: bob.encrypting_key(),
        bob_signing_key: bob.stamp(),
        label: label.to_string(),
        m,
        n,
        expiration: None,
    }
}

/// Grant an `m`-of-`n` policy labelled "test" on `net`.
pub async fn grant(
    net: &TestNetwork,
    m: usize,
    n: usize,
) -> Result<(Alice, Bob, EnactedPolicy), ProtocolError> {
    let alice = net.alice();
    let bob = net.bob();
    let policy = alice.grant(&params(&bob, "test", m, n)).await?;
    Ok((alice, bob, policy))
}
