//! XRPL-specific types and the interface to a rippled node.

use crate::{
    error::{Chain, InputError},
    Condition, RippleTime,
};
use async_trait::async_trait;
use bitcoin::hashes::{sha256d, Hash};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt, str::FromStr};

const ACCOUNT_ID_VERSION: u8 = 0x00;
const ACCOUNT_ID_LENGTH: usize = 20;
const CHECKSUM_LENGTH: usize = 4;
const DROPS_PER_XRP: u64 = 1_000_000;
const XRP_DECIMALS: usize = 6;

/// A classic XRPL address, e.g. `rGgC3koNaoRiA4mDhqDQy1scmviLpyAjNh`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId {
    address: String,
    id: [u8; ACCOUNT_ID_LENGTH],
}

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.id
    }
}

impl FromStr for AccountId {
    type Err = InputError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| InputError::MalformedAddress {
            chain: Chain::Xrpl,
            address: address.to_owned(),
            reason: reason.to_owned(),
        };

        let decoded = bs58::decode(address)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .into_vec()
            .map_err(|e| malformed(&e.to_string()))?;

        if decoded.len() != 1 + ACCOUNT_ID_LENGTH + CHECKSUM_LENGTH {
            return Err(malformed("wrong length"));
        }
        let (payload, checksum) = decoded.split_at(1 + ACCOUNT_ID_LENGTH);
        if payload[0] != ACCOUNT_ID_VERSION {
            return Err(malformed("not an account id"));
        }
        if sha256d::Hash::hash(payload).to_byte_array()[..CHECKSUM_LENGTH] != *checksum {
            return Err(malformed("checksum mismatch"));
        }

        let mut id = [0u8; ACCOUNT_ID_LENGTH];
        id.copy_from_slice(&payload[1..]);

        Ok(AccountId {
            address: address.to_owned(),
            id,
        })
    }
}

impl TryFrom<String> for AccountId {
    type Error = InputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(account: AccountId) -> Self {
        account.address
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.address)
    }
}

/// An amount of XRP in its smallest unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Drops(u64);

impl Drops {
    pub const fn from_drops(drops: u64) -> Self {
        Drops(drops)
    }

    /// Parses a decimal XRP amount with at most six fractional digits.
    pub fn from_xrp(xrp: &str) -> Result<Self, InputError> {
        let invalid = || InputError::InvalidAmount(xrp.to_owned());

        let (whole, fraction) = match xrp.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (xrp, ""),
        };
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty()
            || fraction.len() > XRP_DECIMALS
            || !all_digits(whole)
            || !all_digits(fraction)
        {
            return Err(invalid());
        }

        let whole = whole.parse::<u64>().map_err(|_| invalid())?;
        let fraction = format!("{:0<width$}", fraction, width = XRP_DECIMALS)
            .parse::<u64>()
            .map_err(|_| invalid())?;

        whole
            .checked_mul(DROPS_PER_XRP)
            .and_then(|drops| drops.checked_add(fraction))
            .map(Drops)
            .ok_or_else(invalid)
    }

    pub fn as_drops(self) -> u64 {
        self.0
    }

    pub fn to_xrp_string(self) -> String {
        format!(
            "{}.{:06}",
            self.0 / DROPS_PER_XRP,
            self.0 % DROPS_PER_XRP
        )
    }
}

/// Rendered as drops, the unit of the `Amount` field.
impl fmt::Display for Drops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Drops {
    type Err = InputError;

    fn from_str(drops: &str) -> Result<Self, Self::Err> {
        drops
            .parse::<u64>()
            .map(Drops)
            .map_err(|_| InputError::InvalidAmount(drops.to_owned()))
    }
}

/// An account together with the seed that signs for it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: AccountId,
    pub secret: String,
    pub public_key: Option<String>,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// The node's answer to a submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// The provisional engine result, e.g. `tesSUCCESS`.
    pub engine_result: String,
    pub tx_hash: String,
    /// The account sequence the transaction consumed.
    pub sequence: Option<u32>,
}

/// An escrow ledger object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscrowEntry {
    pub owner: AccountId,
    pub destination: AccountId,
    pub amount: Drops,
    pub condition: Option<Condition>,
    pub cancel_after: Option<RippleTime>,
    /// Finishing is refused until this time has passed.
    pub finish_after: Option<RippleTime>,
    /// Hash of the transaction that created the escrow.
    pub created_by: Option<String>,
}

/// The outcome of a transaction that made it into a validated ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedTransaction {
    pub engine_result: String,
    pub sequence: Option<u32>,
}

/// The subset of rippled functionality the swap needs.
#[async_trait]
pub trait XrplLedger: Send + Sync + 'static {
    /// Signs `tx_json` with `secret` on the node and submits it.
    async fn submit(&self, tx_json: serde_json::Value, secret: &str) -> anyhow::Result<Submission>;

    /// `Ok(None)` until the transaction is part of a validated ledger.
    async fn validated_transaction(
        &self,
        tx_hash: &str,
    ) -> anyhow::Result<Option<ValidatedTransaction>>;

    async fn escrow_entry(
        &self,
        owner: &AccountId,
        offer_sequence: u32,
    ) -> anyhow::Result<Option<EscrowEntry>>;

    /// All escrows `owner` created that are still open.
    async fn escrows_of(&self, owner: &AccountId) -> anyhow::Result<Vec<EscrowEntry>>;

    /// The hex encoded fulfillment of the validated EscrowFinish that settled
    /// the escrow `(owner, offer_sequence)`, if any.
    async fn escrow_finish_fulfillment(
        &self,
        owner: &AccountId,
        offer_sequence: u32,
    ) -> anyhow::Result<Option<String>>;

    /// Close time of the last validated ledger.
    async fn ledger_close_time(&self) -> anyhow::Result<RippleTime>;

    async fn wallet_propose(&self) -> anyhow::Result<Wallet>;
}
