pub mod join_policy;
pub mod public_keys;
pub mod retrieve;

pub use join_policy::JoinPolicyRequest;
pub use public_keys::{PublicKeysRequest, PublicKeysResponse};
pub use retrieve::{RetrieveRequest, RetrieveResponse};
