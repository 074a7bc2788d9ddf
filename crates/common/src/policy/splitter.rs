use crate::crypto::pre::{
    generate_kfrags, DecryptingKey, EncryptingKey, VerifiedKeyFrag, MAX_SHARES,
};
use crate::error::ProtocolError;

/// m-of-n parameters of a policy, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Threshold {
    m: u8,
    n: u8,
}

impl Threshold {
    pub fn new(m: usize, n: usize) -> Result<Self, ProtocolError> {
        if m == 0 || m > n || n > MAX_SHARES {
            return Err(ProtocolError::InvalidThreshold { m, n });
        }
        Ok(Self {
            m: m as u8,
            n: n as u8,
        })
    }

    pub fn m(&self) -> usize {
        self.m as usize
    }

    pub fn n(&self) -> usize {
        self.n as usize
    }
}

/// Everything needed to derive the re-encryption key from Alice's policy
/// secret to Bob.
#[derive(Clone, Copy)]
pub struct RekeyMaterial<'a> {
    /// Secret behind the policy encrypting key. It also signs every
    /// fragment, so Ursulas and Bob check fragments against the policy key.
    pub delegating: &'a DecryptingKey,
    /// Bob's encrypting key.
    pub receiving: &'a EncryptingKey,
}

/// Split the re-encryption key into `n` fragments, any `m` of which suffice.
pub fn split(
    material: RekeyMaterial<'_>,
    m: usize,
    n: usize,
) -> Result<Vec<VerifiedKeyFrag>, ProtocolError> {
    let threshold = Threshold::new(m, n)?;
    let kfrags = generate_kfrags(
        material.delegating,
        material.receiving,
        material.delegating,
        threshold.m(),
        threshold.n(),
    )?;
    tracing::debug!("split re-encryption key into {m}-of-{n} fragments");
    Ok(kfrags)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_threshold_bounds() {
        assert!(Threshold::new(1, 1).is_ok());
        assert!(Threshold::new(255, 255).is_ok());
        for (m, n) in [(0, 0), (0, 1), (3, 2), (1, 256)] {
            assert!(matches!(
                Threshold::new(m, n),
                Err(ProtocolError::InvalidThreshold { .. })
            ));
        }
    }

    #[test]
    fn test_split_yields_distinct_verifiable_fragments() {
        let delegating = DecryptingKey::generate();
        let receiving = DecryptingKey::generate().public();
        let material = RekeyMaterial {
            delegating: &delegating,
            receiving: &receiving,
        };

        let kfrags = split(material, 3, 5).unwrap();
        assert_eq!(kfrags.len(), 5);
        let ids: HashSet<_> = kfrags.iter().map(|k| k.id()).collect();
        assert_eq!(ids.len(), 5);
        for kfrag in &kfrags {
            kfrag
                .unverify()
                .verify(&delegating.public(), &delegating.public(), &receiving)
                .unwrap();
        }

        assert!(matches!(
            split(material, 6, 5),
            Err(ProtocolError::InvalidThreshold { m: 6, n: 5 })
        ));
    }
}
