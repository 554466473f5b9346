//! JSON-RPC backed implementations of the ledger traits.

pub mod bitcoind;
pub mod rippled;

pub use self::{bitcoind::BitcoindConnector, rippled::RippledConnector};
