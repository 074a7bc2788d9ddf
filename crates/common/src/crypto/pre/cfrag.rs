use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use umbral_pre::{DeserializableFromArray, SerializableToArray};

use super::capsule::Capsule;
use super::keys::EncryptingKey;
use super::kfrag::{KFragId, VerifiedKeyFrag, KFRAG_ID_SIZE};
use super::PreError;

/// A partial re-encryption of one capsule under one key fragment, tagged
/// with the id of the fragment the node claims to have used.
///
/// Encoded as `kfrag id (32) || capsule fragment`.
#[derive(Clone)]
pub struct CapsuleFrag {
    kfrag_id: KFragId,
    inner: umbral_pre::CapsuleFrag,
}

/// A capsule fragment whose proof was checked against a specific capsule
/// and policy. Only these can be combined.
#[derive(Clone)]
pub struct VerifiedCapsuleFrag {
    kfrag_id: KFragId,
    inner: umbral_pre::VerifiedCapsuleFrag,
}

impl std::fmt::Debug for CapsuleFrag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleFrag")
            .field("kfrag_id", &self.kfrag_id)
            .finish()
    }
}

impl std::fmt::Debug for VerifiedCapsuleFrag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedCapsuleFrag")
            .field("kfrag_id", &self.kfrag_id)
            .finish()
    }
}

impl PartialEq for CapsuleFrag {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for CapsuleFrag {}

impl VerifiedCapsuleFrag {
    pub fn kfrag_id(&self) -> KFragId {
        self.kfrag_id
    }

    pub(crate) fn into_umbral(self) -> umbral_pre::VerifiedCapsuleFrag {
        self.inner
    }

    /// Drop the verification mark to send the fragment on.
    pub fn unverify(&self) -> CapsuleFrag {
        CapsuleFrag {
            kfrag_id: self.kfrag_id,
            inner: self.inner.clone().unverify(),
        }
    }
}

/// Apply one verified key fragment to a capsule.
pub fn reencrypt(capsule: &Capsule, kfrag: &VerifiedKeyFrag) -> VerifiedCapsuleFrag {
    VerifiedCapsuleFrag {
        kfrag_id: kfrag.id(),
        inner: umbral_pre::reencrypt(&capsule.0, kfrag.umbral().clone()),
    }
}

impl CapsuleFrag {
    pub fn kfrag_id(&self) -> KFragId {
        self.kfrag_id
    }

    /// Check the fragment was computed from `capsule` with a key fragment
    /// that `verifying_key` issued for this delegating/receiving pair.
    pub fn verify(
        self,
        capsule: &Capsule,
        verifying_key: &EncryptingKey,
        delegating: &EncryptingKey,
        receiving: &EncryptingKey,
    ) -> Result<VerifiedCapsuleFrag, PreError> {
        let inner = self
            .inner
            .verify(
                &capsule.0,
                &verifying_key.to_umbral()?,
                &delegating.to_umbral()?,
                &receiving.to_umbral()?,
            )
            .map_err(|_| PreError::InvalidCapsuleFrag)?;
        Ok(VerifiedCapsuleFrag {
            kfrag_id: self.kfrag_id,
            inner,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.kfrag_id.0.to_vec();
        out.extend_from_slice(self.inner.to_array().as_slice());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreError> {
        if bytes.len() < KFRAG_ID_SIZE {
            return Err(PreError::InvalidLength {
                expected: KFRAG_ID_SIZE,
                got: bytes.len(),
            });
        }
        let (id, cfrag) = bytes.split_at(KFRAG_ID_SIZE);
        let mut kfrag_id = [0u8; KFRAG_ID_SIZE];
        kfrag_id.copy_from_slice(id);
        let inner = umbral_pre::CapsuleFrag::from_bytes(cfrag)
            .map_err(|e| PreError::Malformed(format!("capsule fragment: {e:?}")))?;
        Ok(CapsuleFrag {
            kfrag_id: KFragId(kfrag_id),
            inner,
        })
    }
}

impl Serialize for CapsuleFrag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for CapsuleFrag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}
