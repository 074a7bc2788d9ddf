//! Cryptographic primitives for Trove
//!
//! Every character holds two kinds of keys:
//!
//! - **Signing keys** (`SecretKey`/`PublicKey`): Ed25519, shared with the iroh
//!   node identity. Alice signs policy terms and treasure maps with it,
//!   Enrico signs message kits, Ursulas sign arrangement acknowledgments.
//! - **Encrypting keys** (`DecryptingKey`/`EncryptingKey`): secp256k1 keys
//!   for the Umbral threshold proxy re-encryption scheme in [`pre`].
//!
//! # Security Model
//!
//! ## Delegation
//! Alice never publishes the secret behind a policy encrypting key. She
//! splits a re-encryption key for Bob into `n` key fragments; any `m` Ursulas
//! can each transform a capsule into a capsule fragment, and Bob combines `m`
//! of them with his own secret. Fewer than `m` fragments reveal nothing.
//! Each policy key signs its own key fragments, so a fragment verifies only
//! against the policy it was split from.
//!
//! ## Fragment transport
//! A key fragment is only ever readable by the Ursula it was offered to. It
//! travels inside a [`SealedEnvelope`]: ephemeral ECDH against the Ursula's
//! identity key (converted to X25519), AES-KW wrapping of a fresh content
//! key, and ChaCha20-Poly1305 for the payload.

mod keys;
pub mod pre;
mod sealed;

pub use keys::{
    signature_from_slice, KeyError, PublicKey, SecretKey, Signature, PUBLIC_KEY_SIZE,
    SIGNATURE_SIZE,
};
pub use pre::{
    Capsule, CapsuleFrag, DecryptingKey, DelegatingSecret, EncryptingKey, KFragId, KeyFrag,
    PreError, VerifiedCapsuleFrag, VerifiedKeyFrag,
};
pub use sealed::{SealError, SealedEnvelope};

/// Fill a fixed size buffer from the operating system RNG.
pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
    bytes
}

pub(crate) fn encode_pem(tag: &str, contents: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag, contents.to_vec()))
}

pub(crate) fn decode_pem<const N: usize>(tag: &str, pem_str: &str) -> Result<[u8; N], KeyError> {
    let pem = pem::parse(pem_str).map_err(|e| KeyError::Pem(e.to_string()))?;

    if pem.tag() != tag {
        return Err(KeyError::Pem(format!(
            "invalid PEM tag, expected {}, got {}",
            tag,
            pem.tag()
        )));
    }

    let contents = pem.contents();
    if contents.len() != N {
        return Err(KeyError::InvalidLength {
            expected: N,
            got: contents.len(),
        });
    }

    let mut bytes = [0u8; N];
    bytes.copy_from_slice(contents);
    Ok(bytes)
}
