//! Bitcoin-specific types and the interface to a Bitcoin node.
//!
//! This involves:
//!     - Key pairs for the legacy pay-to-pubkey-hash identities used by the HTLC
//!     - The ledger client trait consumed by the [`hbit`](crate::hbit) leg
//!     - Classification of node rejection reasons

pub mod htlc;
pub mod primed_transaction;

pub use self::{
    htlc::{Htlc, UnlockItem, UnlockParameters},
    primed_transaction::{PrimedInput, PrimedTransaction},
};

use crate::{
    error::{InputError, RejectionKind},
    Timestamp,
};
use async_trait::async_trait;
use bitcoin::{
    secp256k1::{All, Secp256k1, SecretKey},
    Address, Amount, Network, OutPoint, PrivateKey, PubkeyHash, PublicKey, Transaction, Txid,
};
use conquer_once::Lazy;
use rand::RngCore;
use std::fmt;

pub static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// A private key together with its compressed public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    pub fn from_wif(wif: &str) -> Result<Self, InputError> {
        let private_key =
            PrivateKey::from_wif(wif).map_err(|e| InputError::MalformedKey(e.to_string()))?;

        Ok(Self::from_private_key(private_key))
    }

    pub fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key(&*SECP);

        Self {
            private_key,
            public_key,
        }
    }

    /// Creates a key pair from fresh randomness.
    pub fn random(network: Network) -> Result<Self, rand::Error> {
        let mut bytes = [0u8; 32];
        let secret_key = loop {
            rand::rngs::OsRng.try_fill_bytes(&mut bytes)?;
            // Fails with probability ~2^-128 for out of range scalars.
            if let Ok(secret_key) = SecretKey::from_slice(&bytes) {
                break secret_key;
            }
        };

        Ok(Self::from_private_key(PrivateKey::new(secret_key, network)))
    }

    pub fn secret_key(&self) -> SecretKey {
        self.private_key.inner
    }

    pub fn private_key(&self) -> PrivateKey {
        self.private_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        self.public_key.pubkey_hash()
    }

    pub fn to_wif(&self) -> String {
        self.private_key.to_wif()
    }

    pub fn address(&self, network: Network) -> Address {
        Address::p2pkh(self.pubkey_hash(), network)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// An unspent output as reported by the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub amount: Amount,
    /// Height of the confirming block, `None` while in the mempool.
    pub height: Option<u32>,
}

/// A transaction and the height of the block that included it, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservedTransaction {
    pub transaction: Transaction,
    pub height: Option<u32>,
}

pub fn confirmations(tip: u32, height: Option<u32>) -> u32 {
    match height {
        Some(height) if height <= tip => tip - height + 1,
        _ => 0,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("node rejected transaction: {0}")]
    Rejected(String),
    #[error("failed to reach node")]
    Connection(#[from] anyhow::Error),
}

/// The subset of node functionality the swap needs.
#[async_trait]
pub trait BitcoinLedger: Send + Sync + 'static {
    async fn submit_raw_transaction(&self, transaction: &Transaction)
        -> Result<Txid, BroadcastError>;

    async fn fetch_raw_transaction(&self, txid: Txid)
        -> anyhow::Result<Option<ObservedTransaction>>;

    async fn fetch_unspent_output(&self, address: &Address) -> anyhow::Result<Option<Utxo>>;

    async fn is_unspent(&self, outpoint: OutPoint) -> anyhow::Result<bool>;

    /// Searches confirmed blocks from `from_height` up to the tip for a
    /// transaction spending `outpoint`.
    async fn find_spending_transaction(
        &self,
        outpoint: OutPoint,
        from_height: u32,
    ) -> anyhow::Result<Option<ObservedTransaction>>;

    async fn block_height(&self) -> anyhow::Result<u32>;

    async fn median_time_past(&self, height: u32) -> anyhow::Result<Timestamp>;

    /// Pays `amount` to `address` from the node's wallet.
    async fn send_to_address(&self, address: &Address, amount: Amount) -> anyhow::Result<Txid>;
}

/// How a node's reject reason should be treated by whoever broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The node already has the transaction, a resubmission succeeded.
    AlreadyKnown,
    Rejected(RejectionKind),
}

pub fn classify_reject_reason(reason: &str) -> RejectReason {
    let reason = reason.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| reason.contains(needle));

    if contains_any(&["already in block chain", "txn-already-known", "txn-already-in-mempool"]) {
        RejectReason::AlreadyKnown
    } else if contains_any(&["non-bip68-final", "non-final"]) {
        RejectReason::Rejected(RejectionKind::PrematureTimelock)
    } else if contains_any(&[
        "missingorspent",
        "missing-inputs",
        "missing inputs",
        "mempool-conflict",
    ]) {
        RejectReason::Rejected(RejectionKind::DoubleSpend)
    } else if contains_any(&["insufficient fee", "min relay fee", "dust", "insufficient funds"]) {
        RejectReason::Rejected(RejectionKind::InsufficientFunds)
    } else if contains_any(&["mandatory-script-verify-flag", "scriptsig", "bad-txns", "tx-size"]) {
        RejectReason::Rejected(RejectionKind::Malformed)
    } else {
        RejectReason::Rejected(RejectionKind::Other)
    }
}
