use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use common::characters::PolicyParams;

use super::control::{encrypting_key, public_key, ControlError};

pub mod create_policy;
pub mod derive_policy_pubkey;
pub mod grant;
pub mod revoke;

pub use create_policy::{CreatePolicyRequest, CreatePolicyResponse};
pub use derive_policy_pubkey::{DerivePolicyPubkeyRequest, DerivePolicyPubkeyResponse};
pub use grant::{GrantRequest, GrantResponse};
pub use revoke::{RevokeRequest, RevokeResponse};

pub(crate) fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(value, &Rfc3339)
}

/// Validate the hex fields of a policy request. Threshold and expiration
/// checks are left to Alice.
pub(crate) fn policy_params(
    bob_encrypting_key: &str,
    bob_signing_key: &str,
    label: &str,
    m: usize,
    n: usize,
    expiration_time: Option<OffsetDateTime>,
) -> Result<PolicyParams, ControlError> {
    Ok(PolicyParams {
        bob_encrypting_key: encrypting_key("bob_encrypting_key", bob_encrypting_key)?,
        bob_signing_key: public_key("bob_signing_key", bob_signing_key)?,
        label: label.to_string(),
        m,
        n,
        expiration: expiration_time.map(|t| t.unix_timestamp().max(0) as u64),
    })
}
