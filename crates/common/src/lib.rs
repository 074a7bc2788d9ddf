/**
 * The four protocol roles: Alice, Bob,
 *  Enrico and Ursula, composed from
 *  capability traits.
 */
pub mod characters;
/**
 * Cryptographic types and operations.
 *  - Signing identities (ed25519)
 *  - Threshold proxy re-encryption
 *  - Sealed envelopes for key fragments
 */
pub mod crypto;
/**
 * Where nodes are, and learning about
 *  the ones we have not met from teachers.
 */
pub mod discovery;
pub mod error;
/**
 * Node-to-node protocol over iroh:
 *  messages, transport and the Ursula
 *  protocol handler.
 */
pub mod peer;
/**
 * Policies: HRACs, key splitting,
 *  arrangements, treasure maps and
 *  message kits.
 */
pub mod policy;
/**
 * Threshold collection of capsule
 *  fragments and reconstruction.
 */
pub mod retrieval;
/**
 * In-process network of Ursulas for
 *  protocol tests.
 */
pub mod testkit;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::characters::{
        Alice, Bob, CanDecrypt, CanEncrypt, CanSign, Enrico, PolicyParams, Ursula,
    };
    pub use crate::crypto::{DecryptingKey, DelegatingSecret, EncryptingKey, PublicKey, SecretKey};
    pub use crate::discovery::{NodeDiscovery, NodeRegistry};
    pub use crate::error::{ErrorCategory, ProtocolError};
    pub use crate::policy::{EncryptedTreasureMap, Hrac, MessageKit, Threshold};
    pub use crate::version::build_info;
}
