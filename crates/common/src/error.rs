use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{KeyError, PreError, PublicKey};
use crate::peer::TransportError;
use crate::policy::TreasureMapError;

/// Coarse classification every protocol failure falls into. The control
/// surface maps each category onto one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The caller sent something unusable. Nothing was attempted.
    Input,
    /// Not enough Ursulas agreed to hold a fragment.
    Negotiation,
    /// Not enough Ursulas answered a re-encryption request.
    Retrieval,
    /// A signature, proof or ciphertext did not check out.
    Integrity,
    /// Local infrastructure (key store, registry, transport) failed.
    Resource,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Input => "input",
            ErrorCategory::Negotiation => "negotiation",
            ErrorCategory::Retrieval => "retrieval",
            ErrorCategory::Integrity => "integrity",
            ErrorCategory::Resource => "resource",
        };
        f.write_str(name)
    }
}

/// Why one node did not contribute to a negotiation or a retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Discovery had no address for the node, and no teacher knew it.
    Unresolvable,
    /// The transport could not reach the node.
    Unreachable(String),
    /// The node did not answer within the per-request timeout.
    TimedOut,
    /// The node answered with a refusal.
    Refused(String),
    /// The node answered, but the answer failed validation.
    InvalidReply(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Unresolvable => write!(f, "node could not be resolved"),
            FailureReason::Unreachable(e) => write!(f, "unreachable: {e}"),
            FailureReason::TimedOut => write!(f, "timed out"),
            FailureReason::Refused(reason) => write!(f, "refused: {reason}"),
            FailureReason::InvalidReply(reason) => write!(f, "invalid reply: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationFailure {
    pub node: PublicKey,
    pub reason: FailureReason,
}

impl DestinationFailure {
    pub fn new(node: PublicKey, reason: FailureReason) -> Self {
        Self { node, reason }
    }
}

impl fmt::Display for DestinationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.reason)
    }
}

struct FailureList<'a>(&'a [DestinationFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no attempts made");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid threshold: need 1 <= m <= n <= 255, got m={m}, n={n}")]
    InvalidThreshold { m: usize, n: usize },
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("no policy for label {0:?}")]
    UnknownPolicy(String),
    #[error("policy expiration {0} is in the past")]
    Expired(u64),
    #[error(
        "policy enactment failed, {accepted} of {required} arrangements accepted ({})",
        FailureList(.failures)
    )]
    EnactmentFailure {
        accepted: usize,
        required: usize,
        failures: Vec<DestinationFailure>,
    },
    #[error(
        "collected {collected} of {required} capsule fragments ({})",
        FailureList(.failures)
    )]
    InsufficientFragments {
        collected: usize,
        required: usize,
        failures: Vec<DestinationFailure>,
    },
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("verification failed: {0}")]
    VerificationFailure(String),
    #[error("message kit was not signed by the expected data source")]
    BadDataSource,
    #[error("node registry error: {0}")]
    Registry(String),
    #[error("key store error: {0}")]
    KeyStore(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ProtocolError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::InvalidThreshold { .. }
            | ProtocolError::InvalidKeyMaterial(_)
            | ProtocolError::MalformedInput(_)
            | ProtocolError::UnknownPolicy(_)
            | ProtocolError::Expired(_) => ErrorCategory::Input,
            ProtocolError::EnactmentFailure { .. } => ErrorCategory::Negotiation,
            ProtocolError::InsufficientFragments { .. } => ErrorCategory::Retrieval,
            ProtocolError::Decrypt(_)
            | ProtocolError::VerificationFailure(_)
            | ProtocolError::BadDataSource => ErrorCategory::Integrity,
            ProtocolError::Registry(_)
            | ProtocolError::KeyStore(_)
            | ProtocolError::Transport(_) => ErrorCategory::Resource,
        }
    }
}

impl From<KeyError> for ProtocolError {
    fn from(e: KeyError) -> Self {
        ProtocolError::InvalidKeyMaterial(e.to_string())
    }
}

impl From<PreError> for ProtocolError {
    fn from(e: PreError) -> Self {
        match e {
            PreError::InvalidThreshold { threshold, shares } => ProtocolError::InvalidThreshold {
                m: threshold,
                n: shares,
            },
            PreError::InvalidLength { .. } | PreError::InvalidHex | PreError::InvalidKey => {
                ProtocolError::InvalidKeyMaterial(e.to_string())
            }
            PreError::Malformed(_) | PreError::Encrypt(_) => {
                ProtocolError::MalformedInput(e.to_string())
            }
            PreError::Decrypt(_) => ProtocolError::Decrypt(e.to_string()),
            PreError::InvalidCapsule
            | PreError::InvalidKeyFrag
            | PreError::InvalidCapsuleFrag
            | PreError::NoFragments
            | PreError::DuplicateFragments => ProtocolError::VerificationFailure(e.to_string()),
        }
    }
}

impl From<TreasureMapError> for ProtocolError {
    fn from(e: TreasureMapError) -> Self {
        match e {
            TreasureMapError::InvalidThreshold { m, n } => ProtocolError::InvalidThreshold { m, n },
            TreasureMapError::TooManyDestinations(_) => ProtocolError::MalformedInput(e.to_string()),
            TreasureMapError::Malformed(_) => ProtocolError::MalformedInput(e.to_string()),
            TreasureMapError::Decrypt(_) => ProtocolError::Decrypt(e.to_string()),
            TreasureMapError::Verification => ProtocolError::VerificationFailure(e.to_string()),
            TreasureMapError::Encrypt(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    #[test]
    fn test_categories() {
        let node = SecretKey::generate().public();
        let cases = [
            (
                ProtocolError::InvalidThreshold { m: 3, n: 2 },
                ErrorCategory::Input,
            ),
            (
                ProtocolError::EnactmentFailure {
                    accepted: 1,
                    required: 2,
                    failures: vec![DestinationFailure::new(node, FailureReason::TimedOut)],
                },
                ErrorCategory::Negotiation,
            ),
            (
                ProtocolError::InsufficientFragments {
                    collected: 0,
                    required: 1,
                    failures: vec![],
                },
                ErrorCategory::Retrieval,
            ),
            (ProtocolError::BadDataSource, ErrorCategory::Integrity),
            (
                ProtocolError::Registry("poisoned".into()),
                ErrorCategory::Resource,
            ),
        ];
        for (error, category) in cases {
            assert_eq!(error.category(), category, "{error}");
        }
    }

    #[test]
    fn test_pre_errors_map_to_categories() {
        let threshold: ProtocolError = PreError::InvalidThreshold {
            threshold: 0,
            shares: 1,
        }
        .into();
        assert!(matches!(
            threshold,
            ProtocolError::InvalidThreshold { m: 0, n: 1 }
        ));
        let key: ProtocolError = PreError::InvalidKey.into();
        assert_eq!(key.category(), ErrorCategory::Input);
        let proof: ProtocolError = PreError::InvalidCapsuleFrag.into();
        assert_eq!(proof.category(), ErrorCategory::Integrity);
    }

    #[test]
    fn test_failure_details_are_listed() {
        let node = SecretKey::generate().public();
        let error = ProtocolError::InsufficientFragments {
            collected: 1,
            required: 2,
            failures: vec![DestinationFailure::new(
                node,
                FailureReason::Refused("policy revoked".into()),
            )],
        };
        let message = error.to_string();
        assert!(message.contains(&node.to_hex()));
        assert!(message.contains("policy revoked"));
        assert_eq!(
            serde_json::to_string(&ErrorCategory::Retrieval).unwrap(),
            "\"retrieval\""
        );
    }
}
