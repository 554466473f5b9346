//! PREIMAGE-SHA-256 crypto-conditions as used by XRPL escrows.
//!
//! Both types are DER encoded. A condition is
//! `A0 <len> 80 20 <sha256(preimage)> 81 <len> <cost>` where the cost is the
//! preimage length, and the matching fulfillment is
//! `A0 <len> 80 <len> <preimage>`.

use crate::{secret::FromErr, Secret, SecretHash};
use bitcoin::hashes::{sha256, Hash};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{convert::TryFrom, fmt, str::FromStr};

const PREIMAGE_SHA256_TYPE: u8 = 0xA0;
const FINGERPRINT_TAG: u8 = 0x80;
const PREIMAGE_TAG: u8 = 0x80;
const COST_TAG: u8 = 0x81;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Condition {
    fingerprint: [u8; 32],
    cost: u32,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Fulfillment {
    preimage: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected tag {expected:#04x} at byte {position}, found {found:#04x}")]
    UnexpectedTag {
        expected: u8,
        found: u8,
        position: usize,
    },
    #[error("encoding ends early at byte {0}")]
    Truncated(usize),
    #[error("declared length {declared} does not match actual length {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("fingerprint must be 32 bytes, found {0}")]
    FingerprintLength(usize),
    #[error("cost does not fit into 32 bits")]
    CostOverflow,
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

impl Condition {
    pub fn from_secret_hash(secret_hash: SecretHash, preimage_length: u32) -> Self {
        Self {
            fingerprint: secret_hash.into_raw(),
            cost: preimage_length,
        }
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let cost = encode_unsigned(self.cost);

        let mut body = vec![FINGERPRINT_TAG, 32];
        body.extend_from_slice(&self.fingerprint);
        body.push(COST_TAG);
        body.extend(encode_length(cost.len()));
        body.extend(cost);

        wrap(PREIMAGE_SHA256_TYPE, body)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);

        let body = reader.tagged(PREIMAGE_SHA256_TYPE)?;
        reader.finish()?;

        let mut reader = Reader::new(body);
        let fingerprint = reader.tagged(FINGERPRINT_TAG)?;
        if fingerprint.len() != 32 {
            return Err(DecodeError::FingerprintLength(fingerprint.len()));
        }
        let cost = reader.tagged(COST_TAG)?;
        reader.finish()?;

        let mut raw = [0u8; 32];
        raw.copy_from_slice(fingerprint);

        Ok(Self {
            fingerprint: raw,
            cost: decode_unsigned(cost)?,
        })
    }

    pub fn is_fulfilled_by(&self, fulfillment: &Fulfillment) -> bool {
        fulfillment.condition() == *self
    }
}

impl Fulfillment {
    pub fn new(preimage: Vec<u8>) -> Self {
        Self { preimage }
    }

    pub fn preimage(&self) -> &[u8] {
        &self.preimage
    }

    /// The condition this fulfillment satisfies.
    #[allow(clippy::cast_possible_truncation)]
    pub fn condition(&self) -> Condition {
        Condition {
            fingerprint: sha256::Hash::hash(&self.preimage).to_byte_array(),
            cost: self.preimage.len() as u32,
        }
    }

    pub fn to_secret(&self) -> Result<Secret, FromErr> {
        Secret::from_vec(&self.preimage)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = vec![PREIMAGE_TAG];
        body.extend(encode_length(self.preimage.len()));
        body.extend_from_slice(&self.preimage);

        wrap(PREIMAGE_SHA256_TYPE, body)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);

        let body = reader.tagged(PREIMAGE_SHA256_TYPE)?;
        reader.finish()?;

        let mut reader = Reader::new(body);
        let preimage = reader.tagged(PREIMAGE_TAG)?.to_vec();
        reader.finish()?;

        Ok(Self { preimage })
    }
}

impl From<Secret> for Fulfillment {
    fn from(secret: Secret) -> Self {
        Self::new(secret.as_raw_secret().to_vec())
    }
}

fn wrap(tag: u8, body: Vec<u8>) -> Vec<u8> {
    let mut encoded = vec![tag];
    encoded.extend(encode_length(body.len()));
    encoded.extend(body);
    encoded
}

#[allow(clippy::cast_possible_truncation)]
fn encode_length(length: usize) -> Vec<u8> {
    if length < 0x80 {
        return vec![length as u8];
    }

    let bytes = length.to_be_bytes();
    let significant = bytes
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(bytes.len() - 1);
    let bytes = &bytes[significant..];

    let mut encoded = vec![0x80 | bytes.len() as u8];
    encoded.extend_from_slice(bytes);
    encoded
}

/// Minimal DER INTEGER content for a non-negative value.
fn encode_unsigned(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let significant = bytes
        .iter()
        .position(|byte| *byte != 0)
        .unwrap_or(bytes.len() - 1);

    let mut encoded = bytes[significant..].to_vec();
    if encoded[0] & 0x80 != 0 {
        encoded.insert(0, 0);
    }
    encoded
}

fn decode_unsigned(bytes: &[u8]) -> Result<u32, DecodeError> {
    let bytes = match bytes {
        [0, rest @ ..] if !rest.is_empty() => rest,
        bytes => bytes,
    };
    if bytes.is_empty() || bytes.len() > 4 {
        return Err(DecodeError::CostOverflow);
    }

    Ok(bytes
        .iter()
        .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)))
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.position)
            .ok_or(DecodeError::Truncated(self.position))?;
        self.position += 1;
        Ok(byte)
    }

    fn length(&mut self) -> Result<usize, DecodeError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }

        let count = usize::from(first & 0x7F);
        if count == 0 || count > 2 {
            return Err(DecodeError::Truncated(self.position));
        }
        (0..count).try_fold(0usize, |acc, _| Ok((acc << 8) | usize::from(self.byte()?)))
    }

    fn tagged(&mut self, expected: u8) -> Result<&'a [u8], DecodeError> {
        let position = self.position;
        let found = self.byte()?;
        if found != expected {
            return Err(DecodeError::UnexpectedTag {
                expected,
                found,
                position,
            });
        }

        let declared = self.length()?;
        let remaining = self.bytes.len() - self.position;
        if declared > remaining {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: remaining,
            });
        }

        let content = &self.bytes[self.position..self.position + declared];
        self.position += declared;
        Ok(content)
    }

    fn finish(&self) -> Result<(), DecodeError> {
        match self.bytes.len() - self.position {
            0 => Ok(()),
            trailing => Err(DecodeError::TrailingBytes(trailing)),
        }
    }
}

macro_rules! impl_hex_encoding {
    ($ty:ident, $expecting:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode_upper(self.to_bytes()))
            }
        }

        impl FromStr for $ty {
            type Err = DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s)?;
                Self::from_bytes(&bytes)
            }
        }

        impl TryFrom<&[u8]> for $ty {
            type Error = DecodeError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                Self::from_bytes(bytes)
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let string = String::deserialize(deserializer)?;
                $ty::from_str(&string).map_err(|_| {
                    de::Error::invalid_value(de::Unexpected::Str(&string), &$expecting)
                })
            }
        }
    };
}

impl_hex_encoding!(Condition, "a hex encoded PREIMAGE-SHA-256 condition");
impl_hex_encoding!(Fulfillment, "a hex encoded PREIMAGE-SHA-256 fulfillment");

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self)
    }
}

/// Redacted, a fulfillment carries the secret.
impl fmt::Debug for Fulfillment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fulfillment({} byte preimage)", self.preimage.len())
    }
}
