//! Failure taxonomy shared by the builders, coordinators and the
//! orchestrator.
//!
//! Every error names the check that failed and the chain it failed on, so the
//! orchestrator can decide between retrying, waiting and abandoning without
//! inspecting messages.

use serde::{Deserialize, Serialize};

/// The two ledgers a swap spans.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
pub enum Chain {
    Bitcoin,
    Xrpl,
}

/// What the caller of a failed operation should do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum Disposition {
    /// A transient fault, the same call may succeed right away.
    Retry,
    /// The ledger is not ready yet, retry once time has passed.
    Wait,
    /// Retrying cannot help. Fall back to the refund path if funds are locked.
    Abandon,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Input(#[from] InputError),
    #[error("{chain} ledger rejected the operation: {rejection}")]
    Rejected { chain: Chain, rejection: Rejection },
    #[error("protocol violation on {chain}: {violation}")]
    Violation { chain: Chain, violation: Violation },
    #[error("failed to extract the secret from {chain}: {source}")]
    Extraction {
        chain: Chain,
        #[source]
        source: ExtractionError,
    },
    #[error("communication with the {chain} ledger failed")]
    Connection {
        chain: Chain,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub fn rejected(chain: Chain, kind: RejectionKind, reason: impl Into<String>) -> Self {
        Error::Rejected {
            chain,
            rejection: Rejection {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn violation(chain: Chain, violation: Violation) -> Self {
        Error::Violation { chain, violation }
    }

    pub fn extraction(chain: Chain, source: ExtractionError) -> Self {
        Error::Extraction { chain, source }
    }

    pub fn connection(chain: Chain, source: anyhow::Error) -> Self {
        Error::Connection { chain, source }
    }

    pub fn chain(&self) -> Option<Chain> {
        match self {
            Error::Input(_) => None,
            Error::Rejected { chain, .. }
            | Error::Violation { chain, .. }
            | Error::Extraction { chain, .. }
            | Error::Connection { chain, .. } => Some(*chain),
        }
    }

    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            Error::Rejected { rejection, .. } => Some(rejection.kind),
            _ => None,
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Error::Connection { .. } => Disposition::Retry,
            Error::Rejected { rejection, .. } => match rejection.kind {
                RejectionKind::Transient => Disposition::Retry,
                RejectionKind::PrematureTimelock => Disposition::Wait,
                _ => Disposition::Abandon,
            },
            Error::Input(_) | Error::Violation { .. } | Error::Extraction { .. } => {
                Disposition::Abandon
            }
        }
    }
}

/// Problems detected before anything is submitted to a ledger.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("relative timelock of {value} {unit} cannot be encoded")]
    TimelockOverflow { value: u32, unit: &'static str },
    #[error("relative timelock of {seconds} seconds is not a multiple of 512")]
    TimelockGranularity { seconds: u32 },
    #[error("claim and refund identity must differ")]
    IdenticalIdentities,
    #[error("fee of {fee} leaves nothing of the locked {amount}")]
    InsufficientFunds {
        amount: bitcoin::Amount,
        fee: bitcoin::Amount,
    },
    #[error("redeem script is too large for a script hash address")]
    ScriptTooLarge,
    #[error("malformed {chain} address {address}: {reason}")]
    MalformedAddress {
        chain: Chain,
        address: String,
        reason: String,
    },
    #[error("malformed key: {0}")]
    MalformedKey(String),
    #[error("key does not belong to {0}")]
    KeyMismatch(String),
    #[error("invalid amount {0}")]
    InvalidAmount(String),
    #[error("time {0} lies before the ripple epoch")]
    BeforeRippleEpoch(u32),
    #[error("failed to sign: {0}")]
    Signing(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} ({reason})")]
pub struct Rejection {
    pub kind: RejectionKind,
    /// The ledger's own reason, e.g. `non-BIP68-final` or `tecNO_PERMISSION`.
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum RejectionKind {
    InsufficientFunds,
    /// The timelock has not matured yet. Expected during refunds.
    PrematureTimelock,
    /// The locked output was already consumed by a competing spend.
    DoubleSpend,
    /// The escrow was already finished or cancelled.
    AlreadySettled,
    ConditionMismatch,
    Malformed,
    Transient,
    Other,
}

/// A counterparty or the ledger state does not match what was agreed.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("locked amount {actual} differs from agreed {expected}")]
    AmountMismatch { expected: String, actual: String },
    #[error("escrow condition differs from the swap's condition")]
    ConditionMismatch,
    #[error("lock pays {actual} instead of {expected}")]
    DestinationMismatch { expected: String, actual: String },
    #[error("lock becomes refundable in {remaining_secs}s, at least {required_secs}s required")]
    InsufficientTimeout {
        remaining_secs: u64,
        required_secs: u64,
    },
    #[error("escrow cannot be finished before {finish_after}")]
    DelayedFinish { finish_after: u32 },
    #[error("fulfillment does not satisfy the condition")]
    FulfillmentMismatch,
    #[error("revealed secret does not match the secret hash")]
    HashMismatch,
}

/// A claim was observed but the secret could not be recovered from it.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("unlocking script does not decompile: {0}")]
    Undecodable(String),
    #[error("unlocking script has {found} elements, expected {expected}")]
    TooFewElements { expected: usize, found: usize },
    #[error("element {position} is {length} bytes, not a 32 byte preimage")]
    NotAPreimage { position: usize, length: usize },
    #[error("unlocking script does not select the hash branch")]
    WrongBranch,
    #[error("malformed fulfillment: {0}")]
    MalformedFulfillment(String),
}
