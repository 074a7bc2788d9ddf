use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use umbral_pre::{DeserializableFromArray, RepresentableAsArray, SerializableToArray};

use super::PreError;

/// Encapsulated key material for one ciphertext.
#[derive(Clone, Debug)]
pub struct Capsule(pub(crate) umbral_pre::Capsule);

impl Capsule {
    /// Length of [`Capsule::to_bytes`].
    pub fn serialized_size() -> usize {
        umbral_pre::Capsule::serialized_size()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_array().to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreError> {
        if bytes.len() != Self::serialized_size() {
            return Err(PreError::InvalidLength {
                expected: Self::serialized_size(),
                got: bytes.len(),
            });
        }
        umbral_pre::Capsule::from_bytes(bytes)
            .map(Self)
            .map_err(|_| PreError::InvalidCapsule)
    }
}

impl PartialEq for Capsule {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Capsule {}

impl Serialize for Capsule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Capsule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::pre::{encrypt, DecryptingKey};

    #[test]
    fn test_capsule_encoding() {
        let key = DecryptingKey::generate();
        let (capsule, _) = encrypt(&key.public(), b"payload").unwrap();
        let bytes = capsule.to_bytes();
        assert_eq!(bytes.len(), Capsule::serialized_size());
        assert_eq!(Capsule::from_bytes(&bytes).unwrap(), capsule);

        let encoded = bincode::serialize(&capsule).unwrap();
        assert_eq!(bincode::deserialize::<Capsule>(&encoded).unwrap(), capsule);
    }

    #[test]
    fn test_malformed_capsule_is_rejected() {
        let (capsule, _) = encrypt(&DecryptingKey::generate().public(), b"x").unwrap();
        let bytes = capsule.to_bytes();
        assert!(matches!(
            Capsule::from_bytes(&bytes[1..]),
            Err(PreError::InvalidLength { .. })
        ));
        assert!(matches!(
            Capsule::from_bytes(&vec![0xFF; Capsule::serialized_size()]),
            Err(PreError::InvalidCapsule)
        ));
    }
}
