#![warn(
    unused_extern_crates,
    missing_debug_implementations,
    missing_copy_implementations,
    rust_2018_idioms,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::fallible_impl_from,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::print_stdout,
    clippy::dbg_macro
)]
#![cfg_attr(not(test), warn(clippy::unwrap_used))]
#![forbid(unsafe_code)]

pub mod bitcoin;
pub mod connectors;
pub mod crypto_condition;
pub mod error;
pub mod escrow;
pub mod hbit;
pub mod jsonrpc;
pub mod ledger;
pub mod secret_lock;
pub mod swap;
pub mod timelock;
pub mod xrpl;

mod secret;
mod secret_hash;
mod swap_id;
mod timestamp;

#[cfg(test)]
mod test_harness;

/// A module for exporting dependencies that appear in the public API of our
/// crate.
///
/// Consumers such as the daemon can reach the exact `bitcoin` version used by
/// the builders without declaring a dependency whose version would need to be
/// kept in sync.
pub mod export {
    pub use ::bitcoin;
}

pub use self::{
    crypto_condition::{Condition, Fulfillment},
    error::{Chain, Disposition, Error},
    secret::Secret,
    secret_hash::SecretHash,
    secret_lock::SecretLock,
    swap_id::SwapId,
    timelock::RelativeTimelock,
    timestamp::{RippleTime, Timestamp},
};

use serde::{Deserialize, Serialize};

/// Defines the locking protocols a swap leg can use.
///
/// A locking protocol implies both the ledger and the mechanism used to lock
/// the asset under the swap's hash commitment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LockProtocol {
    /// A P2SH hash-and-relative-timelock contract on Bitcoin, see
    /// [`hbit`](crate::hbit).
    Hbit,
    /// A native XRPL escrow with a PREIMAGE-SHA-256 condition, see
    /// [`escrow`](crate::escrow).
    Escrow,
}

/// The role a party plays in a swap.
///
/// The initiator generates the secret and locks first, on the alpha ledger,
/// with the longer timeout. The responder locks second, on the beta ledger,
/// after verifying the initiator's lock.
#[derive(
    Clone,
    Copy,
    Debug,
    strum_macros::Display,
    strum_macros::EnumString,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Initiator,
    Responder,
}
