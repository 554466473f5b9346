//! The lock material shared by both legs of a swap.

use crate::{Condition, Fulfillment, Secret, SecretHash};
use serde::{Deserialize, Serialize};

/// A secret together with everything derived from it.
///
/// The hash goes into the Bitcoin redeem script, the condition into the XRPL
/// escrow. The fulfillment only exists on the side of whoever holds the
/// secret.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecretLock {
    pub secret: Secret,
    pub secret_hash: SecretHash,
    pub condition: Condition,
    pub fulfillment: Fulfillment,
}

impl SecretLock {
    /// Creates the lock material for a freshly generated secret.
    ///
    /// Fails only if the operating system cannot provide entropy.
    pub fn generate() -> Result<Self, rand::Error> {
        let secret = Secret::generate()?;

        Ok(Self::from_secret(secret))
    }

    /// Derives the lock material from a given secret. All fields are pure
    /// functions of `secret`.
    pub fn from_secret(secret: Secret) -> Self {
        let fulfillment = Fulfillment::from(secret);

        Self {
            secret,
            secret_hash: SecretHash::new(secret),
            condition: fulfillment.condition(),
            fulfillment,
        }
    }

    pub fn public(&self) -> PublicLock {
        PublicLock {
            secret_hash: self.secret_hash,
            condition: self.condition,
        }
    }
}

/// The part of a [`SecretLock`] that can be shared before the secret is
/// revealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicLock {
    pub secret_hash: SecretHash,
    pub condition: Condition,
}

impl From<SecretHash> for PublicLock {
    fn from(secret_hash: SecretHash) -> Self {
        Self {
            secret_hash,
            condition: Condition::from_secret_hash(
                secret_hash,
                crate::secret::SECRET_LENGTH as u32,
            ),
        }
    }
}
