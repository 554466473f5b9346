use bitcoin::hashes::{sha256, Hash};
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

pub const SECRET_LENGTH: usize = 32;

/// The preimage of a swap's hashlock.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret([u8; SECRET_LENGTH]);

impl Secret {
    /// Draws a new secret from the operating system's entropy source.
    pub fn generate() -> Result<Self, rand::Error> {
        let mut bytes = [0u8; SECRET_LENGTH];
        rand::rngs::OsRng.try_fill_bytes(&mut bytes)?;

        Ok(Secret(bytes))
    }

    pub fn from_vec(vec: &[u8]) -> Result<Secret, FromErr> {
        if vec.len() != SECRET_LENGTH {
            return Err(FromErr::InvalidLength {
                expected: SECRET_LENGTH,
                got: vec.len(),
            });
        }
        let mut data = [0; SECRET_LENGTH];
        data.copy_from_slice(vec);
        Ok(Secret(data))
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256::Hash::hash(&self.0).to_byte_array()
    }

    pub fn as_raw_secret(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    pub fn into_raw_secret(self) -> [u8; SECRET_LENGTH] {
        self.0
    }
}

impl From<[u8; SECRET_LENGTH]> for Secret {
    fn from(secret: [u8; SECRET_LENGTH]) -> Self {
        Secret(secret)
    }
}

/// Redacted, the secret must not end up in logs before it is revealed on
/// chain.
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

impl fmt::LowerHex for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum FromErr {
    #[error("invalid secret length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("secret is not valid hex: {0}")]
    FromHex(#[from] hex::FromHexError),
}

impl FromStr for Secret {
    type Err = FromErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vec = hex::decode(s)?;
        Self::from_vec(&vec)
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:x}", self))
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;

        impl<'vde> de::Visitor<'vde> for Visitor {
            type Value = Secret;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a hex encoded 32 byte value")
            }

            fn visit_str<E>(self, v: &str) -> Result<Secret, E>
            where
                E: de::Error,
            {
                Secret::from_str(v).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(v), &"hex encoded bytes")
                })
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}
