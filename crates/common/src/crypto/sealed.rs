//! Envelopes readable only by one node identity
//!
//! Used to hand a key fragment to the Ursula it is offered to.
//!
//! To seal a payload for a recipient:
//! 1. **Generate ephemeral keypair**: a throwaway Ed25519 key
//! 2. **Perform ECDH**: both keys converted to X25519
//! 3. **Wrap key**: a fresh content key is AES-KW wrapped under the shared secret
//! 4. **Encrypt**: the payload is encrypted under the content key, with the
//!    ephemeral public key as associated data
//!
//! # Wire Format
//!
//! ```text
//! [ ephemeral_pubkey: 32 bytes ][ wrapped_key: 40 bytes ][ nonce || ciphertext || tag ]
//! ```

use aes_kw::KekAes256 as Kek;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of the content key (256 bits)
pub const CONTENT_KEY_SIZE: usize = 32;
/// Size of the Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
/// Size of AES Key Wrap integrity block in bytes
pub const KW_NONCE_SIZE: usize = 8;
/// Size of the envelope header (ephemeral key and wrapped content key)
pub const SEALED_HEADER_SIZE: usize = PUBLIC_KEY_SIZE + CONTENT_KEY_SIZE + KW_NONCE_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("envelope too short: {0} bytes")]
    TooShort(usize),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("AES-KW wrap error")]
    Wrap,
    #[error("AES-KW unwrap error: envelope was sealed for another node")]
    Unwrap,
    #[error("payload encryption failed")]
    Encrypt,
    #[error("payload failed authentication")]
    Payload,
}

/// `nonce || ciphertext || tag` under a one-time content key.
fn encrypt_payload(
    key: &[u8; CONTENT_KEY_SIZE],
    payload: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, SealError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce_bytes = super::random_bytes::<NONCE_SIZE>();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: payload, aad })
        .map_err(|_| SealError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(nonce.as_ref());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt_payload(
    key: &[u8; CONTENT_KEY_SIZE],
    data: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, SealError> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(SealError::Payload);
    }
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &data[NONCE_SIZE..],
                aad,
            },
        )
        .map_err(|_| SealError::Payload)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope(Vec<u8>);

impl SealedEnvelope {
    pub fn seal(payload: &[u8], recipient: &PublicKey) -> Result<Self, SealError> {
        let ephemeral_private = SecretKey::generate();
        let ephemeral_public = ephemeral_private.public().to_bytes();

        let shared_secret = ephemeral_private
            .to_x25519()
            .diffie_hellman(&recipient.to_x25519()?);
        let kek = Kek::from(*shared_secret.as_bytes());

        let content_key = super::random_bytes::<CONTENT_KEY_SIZE>();
        let wrapped = kek.wrap_vec(&content_key).map_err(|_| SealError::Wrap)?;
        let ciphertext = encrypt_payload(&content_key, payload, &ephemeral_public)?;

        let mut out = Vec::with_capacity(SEALED_HEADER_SIZE + ciphertext.len());
        out.extend_from_slice(&ephemeral_public);
        out.extend_from_slice(&wrapped);
        out.extend_from_slice(&ciphertext);
        Ok(Self(out))
    }

    pub fn open(&self, recipient: &SecretKey) -> Result<Vec<u8>, SealError> {
        if self.0.len() < SEALED_HEADER_SIZE {
            return Err(SealError::TooShort(self.0.len()));
        }

        let ephemeral_bytes = &self.0[..PUBLIC_KEY_SIZE];
        let ephemeral_public = PublicKey::try_from(ephemeral_bytes)?;

        let shared_secret = recipient
            .to_x25519()
            .diffie_hellman(&ephemeral_public.to_x25519()?);
        let kek = Kek::from(*shared_secret.as_bytes());

        let unwrapped = kek
            .unwrap_vec(&self.0[PUBLIC_KEY_SIZE..SEALED_HEADER_SIZE])
            .map_err(|_| SealError::Unwrap)?;
        let content_key: [u8; CONTENT_KEY_SIZE] =
            unwrapped.try_into().map_err(|_| SealError::Unwrap)?;

        decrypt_payload(&content_key, &self.0[SEALED_HEADER_SIZE..], ephemeral_bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
