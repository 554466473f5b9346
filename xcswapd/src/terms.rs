//! What two parties agreed on before a swap starts.
//!
//! The terms file is written once and handed to both parties. The offer is
//! produced by the initiator and carries what only the initiator can know:
//! the hash of its secret and the absolute time after which the escrow can be
//! cancelled.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use xcswap::{
    bitcoin::KeyPair,
    escrow,
    export::bitcoin::{Amount, PublicKey},
    hbit, ledger,
    secret_lock::PublicLock,
    xrpl::{AccountId, Drops, Wallet},
    RelativeTimelock, RippleTime, Role, SecretHash, SwapId,
};

/// Which asset the initiator locks first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Direction {
    /// The initiator sells XRP for bitcoin.
    EscrowHbit,
    /// The initiator sells bitcoin for XRP.
    HbitEscrow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Terms {
    pub direction: Direction,
    pub xrp: XrpTerms,
    pub btc: BtcTerms,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct XrpTerms {
    #[serde(with = "xrp_amount")]
    pub amount: Drops,
    pub sender: AccountId,
    pub receiver: AccountId,
    /// Seconds the escrow stays open after the offer was made.
    pub timeout_secs: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BtcTerms {
    #[serde(with = "xcswap::export::bitcoin::amount::serde::as_btc")]
    pub amount: Amount,
    /// Locks the HTLC and holds its refund key.
    pub sender: PublicKey,
    /// Holds the claim key.
    pub receiver: PublicKey,
    pub timelock_blocks: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub swap_id: SwapId,
    pub secret_hash: SecretHash,
    pub cancel_after: RippleTime,
}

impl Terms {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read terms {}", path.display()))?;

        toml::from_str(&contents).with_context(|| format!("invalid terms {}", path.display()))
    }

    pub fn hbit_params(
        &self,
        network: ledger::Bitcoin,
        secret_hash: SecretHash,
    ) -> anyhow::Result<hbit::Params> {
        Ok(hbit::Params {
            network,
            asset: self.btc.amount,
            claim_identity: self.btc.receiver,
            refund_identity: self.btc.sender,
            timelock: RelativeTimelock::blocks(self.btc.timelock_blocks)?,
            secret_hash,
        })
    }

    pub fn escrow_params(&self, offer: &Offer) -> escrow::Params {
        escrow::Params {
            owner: self.xrp.sender.clone(),
            destination: self.xrp.receiver.clone(),
            amount: self.xrp.amount,
            condition: PublicLock::from(offer.secret_hash).condition,
            cancel_after: offer.cancel_after,
        }
    }

    /// Checks that our keys are the ones the terms expect of `role`.
    pub fn check_identities(
        &self,
        role: Role,
        key_pair: &KeyPair,
        wallet: &Wallet,
    ) -> anyhow::Result<()> {
        let sells_xrp = matches!(
            (self.direction, role),
            (Direction::EscrowHbit, Role::Initiator) | (Direction::HbitEscrow, Role::Responder)
        );
        let (xrp_party, btc_party) = if sells_xrp {
            (&self.xrp.sender, self.btc.receiver)
        } else {
            (&self.xrp.receiver, self.btc.sender)
        };

        if wallet.address != *xrp_party {
            anyhow::bail!(
                "configured XRPL account {} is not {} of the terms",
                wallet.address,
                xrp_party
            );
        }
        if key_pair.public_key() != btc_party {
            anyhow::bail!(
                "configured bitcoin key {} is not {} of the terms",
                key_pair.public_key(),
                btc_party
            );
        }

        Ok(())
    }
}

impl Offer {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read offer {}", path.display()))?;

        serde_json::from_str(&contents).with_context(|| format!("invalid offer {}", path.display()))
    }
}

mod xrp_amount {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use xcswap::xrpl::Drops;

    pub fn serialize<S>(drops: &Drops, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&drops.to_xrp_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Drops, D::Error>
    where
        D: Deserializer<'de>,
    {
        let xrp = String::deserialize(deserializer)?;

        Drops::from_xrp(&xrp).map_err(D::Error::custom)
    }
}
