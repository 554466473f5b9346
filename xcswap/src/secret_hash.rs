use crate::Secret;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// The SHA-256 hashlock shared by both legs of a swap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretHash([u8; 32]);

impl SecretHash {
    pub fn new(secret: Secret) -> Self {
        Self(secret.hash())
    }

    pub fn from_raw(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_raw(self) -> [u8; 32] {
        self.0
    }

    pub fn is_unlocked_by(&self, secret: &Secret) -> bool {
        Self::new(*secret) == *self
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretHash({:x})", self)
    }
}

impl fmt::Display for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self)
    }
}

impl fmt::LowerHex for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum FromStrError {
    #[error("secret hash is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("secret hash must be 32 bytes, got {0}")]
    Length(usize),
}

impl FromStr for SecretHash {
    type Err = FromStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vec = hex::decode(s)?;
        if vec.len() != 32 {
            return Err(FromStrError::Length(vec.len()));
        }

        let mut raw = [0u8; 32];
        raw.copy_from_slice(&vec);

        Ok(Self(raw))
    }
}

impl Serialize for SecretHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:x}", self))
    }
}

impl<'de> Deserialize<'de> for SecretHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> de::Visitor<'vde> for Visitor {
            type Value = SecretHash;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a hex encoded 32 byte value")
            }

            fn visit_str<E>(self, v: &str) -> Result<SecretHash, E>
            where
                E: de::Error,
            {
                SecretHash::from_str(v).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(v), &"hex encoded 32 bytes")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[test]
    fn hashes_known_secret() {
        let secret = Secret::from_str(
            "3E6A02FCF6C42AB846FD0FB8C13E68C72806432FD7FB775F1036B3067D19CDFF",
        )
        .unwrap();

        assert_that!(SecretHash::new(secret).to_string()).is_equal_to(
            "14e0a17b13d84c9f401fb5feace39e37e860948c6eac366e33bae2b4866f199a".to_owned(),
        );
    }

    #[test]
    fn only_the_preimage_unlocks() {
        let secret = Secret::from(*b"This is our favourite passphrase");
        let other = Secret::from(*b"This is not our favourite phrase");
        let hash = SecretHash::new(secret);

        assert!(hash.is_unlocked_by(&secret));
        assert!(!hash.is_unlocked_by(&other));
    }
}
