//! Threshold proxy re-encryption over `umbral-pre`
//!
//! Thin typed layer over the Umbral scheme:
//!
//! - [`encrypt`] makes a [`Capsule`] for an [`EncryptingKey`] and encrypts
//!   the payload under the key it encapsulates.
//! - [`generate_kfrags`] splits a re-encryption key from a delegating key to
//!   a receiving key into `n` signed key fragments with threshold `m`.
//! - [`reencrypt`] turns a capsule plus one verified key fragment into a
//!   capsule fragment carrying a proof of correct re-encryption.
//! - [`decrypt_reencrypted`] combines `m` verified capsule fragments with
//!   the receiving secret to open the payload.
//!
//! Fragments carry a [`KFragId`] so treasure maps can name them.

mod capsule;
mod cfrag;
mod keys;
mod kfrag;

pub use capsule::Capsule;
pub use cfrag::{reencrypt, CapsuleFrag, VerifiedCapsuleFrag};
pub use keys::{
    DecryptingKey, DelegatingSecret, EncryptingKey, DECRYPTING_KEY_SIZE, ENCRYPTING_KEY_SIZE,
};
pub use kfrag::{generate_kfrags, KFragId, KeyFrag, VerifiedKeyFrag, KFRAG_ID_SIZE, MAX_SHARES};

#[derive(Debug, thiserror::Error)]
pub enum PreError {
    #[error("invalid threshold: need 1 <= m <= n <= 255, got m={threshold}, n={shares}")]
    InvalidThreshold { threshold: usize, shares: usize },
    #[error("invalid length, expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("bytes do not encode a valid key")]
    InvalidKey,
    #[error("bytes do not encode a valid capsule")]
    InvalidCapsule,
    #[error("malformed {0}")]
    Malformed(String),
    #[error("key fragment does not match its signer or keys")]
    InvalidKeyFrag,
    #[error("capsule fragment failed verification")]
    InvalidCapsuleFrag,
    #[error("no capsule fragments supplied")]
    NoFragments,
    #[error("capsule fragments repeat a key fragment")]
    DuplicateFragments,
    #[error("encryption failed: {0}")]
    Encrypt(String),
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Encrypt `plaintext` for the holder of `key` (or, after delegation, for
/// whoever can gather enough capsule fragments).
pub fn encrypt(key: &EncryptingKey, plaintext: &[u8]) -> Result<(Capsule, Vec<u8>), PreError> {
    let (capsule, ciphertext) = umbral_pre::encrypt(&key.to_umbral()?, plaintext)
        .map_err(|e| PreError::Encrypt(format!("{e:?}")))?;
    Ok((Capsule(capsule), ciphertext.into_vec()))
}

/// Decrypt with the secret the capsule was made for.
pub fn decrypt_original(
    key: &DecryptingKey,
    capsule: &Capsule,
    ciphertext: &[u8],
) -> Result<Vec<u8>, PreError> {
    umbral_pre::decrypt_original(key.umbral(), &capsule.0, ciphertext)
        .map(|plaintext| plaintext.into_vec())
        .map_err(|e| PreError::Decrypt(format!("{e:?}")))
}

/// Decrypt as the receiver of a delegation from `delegating`, using
/// verified capsule fragments of distinct key fragments.
pub fn decrypt_reencrypted(
    receiving: &DecryptingKey,
    delegating: &EncryptingKey,
    capsule: &Capsule,
    cfrags: &[VerifiedCapsuleFrag],
    ciphertext: &[u8],
) -> Result<Vec<u8>, PreError> {
    if cfrags.is_empty() {
        return Err(PreError::NoFragments);
    }
    for (i, cfrag) in cfrags.iter().enumerate() {
        if cfrags[..i].iter().any(|c| c.kfrag_id() == cfrag.kfrag_id()) {
            return Err(PreError::DuplicateFragments);
        }
    }
    umbral_pre::decrypt_reencrypted(
        receiving.umbral(),
        &delegating.to_umbral()?,
        &capsule.0,
        cfrags.iter().cloned().map(VerifiedCapsuleFrag::into_umbral),
        ciphertext,
    )
    .map(|plaintext| plaintext.into_vec())
    .map_err(|e| PreError::Decrypt(format!("{e:?}")))
}

#[cfg(test)]
mod test {
    use super::*;

    struct Delegation {
        delegating: DecryptingKey,
        bob: DecryptingKey,
    }

    impl Delegation {
        fn new() -> Self {
            Self {
                delegating: DecryptingKey::generate(),
                bob: DecryptingKey::generate(),
            }
        }

        fn policy_key(&self) -> EncryptingKey {
            self.delegating.public()
        }

        fn kfrags(&self, m: usize, n: usize) -> Vec<VerifiedKeyFrag> {
            generate_kfrags(&self.delegating, &self.bob.public(), &self.delegating, m, n).unwrap()
        }

        fn verified(
            &self,
            capsule: &Capsule,
            kfrags: &[&VerifiedKeyFrag],
        ) -> Vec<VerifiedCapsuleFrag> {
            kfrags
                .iter()
                .map(|kfrag| {
                    reencrypt(capsule, kfrag)
                        .unverify()
                        .verify(
                            capsule,
                            &self.policy_key(),
                            &self.policy_key(),
                            &self.bob.public(),
                        )
                        .unwrap()
                })
                .collect()
        }

        fn open(
            &self,
            capsule: &Capsule,
            cfrags: &[VerifiedCapsuleFrag],
            ciphertext: &[u8],
        ) -> Result<Vec<u8>, PreError> {
            decrypt_reencrypted(&self.bob, &self.policy_key(), capsule, cfrags, ciphertext)
        }
    }

    /// All subsets of `0..n` of size `m`.
    fn subsets(n: usize, m: usize) -> Vec<Vec<usize>> {
        (0u32..(1 << n))
            .filter(|mask| mask.count_ones() as usize == m)
            .map(|mask| (0..n).filter(|i| mask & (1 << i) != 0).collect())
            .collect()
    }

    #[test]
    fn test_decrypt_original() {
        let key = DecryptingKey::generate();
        let (capsule, ciphertext) = encrypt(&key.public(), b"hello").unwrap();
        assert_eq!(decrypt_original(&key, &capsule, &ciphertext).unwrap(), b"hello");

        let wrong = DecryptingKey::generate();
        assert!(matches!(
            decrypt_original(&wrong, &capsule, &ciphertext),
            Err(PreError::Decrypt(_))
        ));
    }

    #[test]
    fn test_every_threshold_subset_decrypts() {
        let delegation = Delegation::new();
        for (m, n) in [(1, 1), (1, 3), (2, 3), (3, 3), (2, 5), (3, 5), (4, 5)] {
            let kfrags = delegation.kfrags(m, n);
            let plaintext = format!("message for {m}-of-{n}");
            let (capsule, ciphertext) =
                encrypt(&delegation.policy_key(), plaintext.as_bytes()).unwrap();

            for subset in subsets(n, m) {
                let chosen: Vec<&VerifiedKeyFrag> = subset.iter().map(|i| &kfrags[*i]).collect();
                let cfrags = delegation.verified(&capsule, &chosen);
                let recovered = delegation.open(&capsule, &cfrags, &ciphertext).unwrap();
                assert_eq!(recovered, plaintext.as_bytes(), "subset {subset:?} of {m}-of-{n}");
            }
        }
    }

    #[test]
    fn test_below_threshold_never_decrypts() {
        let delegation = Delegation::new();
        let (m, n) = (3, 5);
        let kfrags = delegation.kfrags(m, n);
        let (capsule, ciphertext) = encrypt(&delegation.policy_key(), b"secret").unwrap();

        for size in 1..m {
            for subset in subsets(n, size) {
                let chosen: Vec<&VerifiedKeyFrag> = subset.iter().map(|i| &kfrags[*i]).collect();
                let cfrags = delegation.verified(&capsule, &chosen);
                assert!(matches!(
                    delegation.open(&capsule, &cfrags, &ciphertext),
                    Err(PreError::Decrypt(_))
                ));
            }
        }
    }

    #[test]
    fn test_only_the_receiver_can_combine() {
        let delegation = Delegation::new();
        let kfrags = delegation.kfrags(1, 2);
        let (capsule, ciphertext) = encrypt(&delegation.policy_key(), b"for bob").unwrap();
        let cfrags = delegation.verified(&capsule, &[&kfrags[0]]);

        let eve = DecryptingKey::generate();
        assert!(decrypt_reencrypted(
            &eve,
            &delegation.policy_key(),
            &capsule,
            &cfrags,
            &ciphertext
        )
        .is_err());
    }

    #[test]
    fn test_combine_rejects_degenerate_inputs() {
        let delegation = Delegation::new();
        let kfrags = delegation.kfrags(2, 3);
        let (capsule, ciphertext) = encrypt(&delegation.policy_key(), b"x").unwrap();

        assert!(matches!(
            delegation.open(&capsule, &[], &ciphertext),
            Err(PreError::NoFragments)
        ));

        let cfrags = delegation.verified(&capsule, &[&kfrags[0], &kfrags[0]]);
        assert!(matches!(
            delegation.open(&capsule, &cfrags, &ciphertext),
            Err(PreError::DuplicateFragments)
        ));

        // two fragments, each from a different split of the same delegation
        let other_split = delegation.kfrags(2, 3);
        let mut mixed = delegation.verified(&capsule, &[&kfrags[0]]);
        mixed.extend(delegation.verified(&capsule, &[&other_split[1]]));
        assert!(delegation.open(&capsule, &mixed, &ciphertext).is_err());
    }
}
