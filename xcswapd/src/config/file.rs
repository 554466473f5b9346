use crate::config::{Bitcoind, Data};
use config as config_rs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::level_filters::LevelFilter;
use url::Url;
use xcswap::{ledger, xrpl::AccountId};

/// The configuration file as it appears on disk.
///
/// Every section and most of their fields are optional. Defaults are
/// filled in by [`Settings`](crate::config::Settings).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct File {
    pub data: Option<Data>,
    pub logging: Option<Logging>,
    pub bitcoin: Option<Bitcoin>,
    pub xrpl: Option<Xrpl>,
    pub swap: Option<Swap>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Bitcoin {
    pub network: Option<ledger::Bitcoin>,
    /// Flat fee of every claim and refund transaction.
    pub fee_sat: Option<u64>,
    pub block_interval_secs: Option<u64>,
    /// WIF of the key that claims or refunds the HTLC.
    pub private_key: Option<String>,
    pub bitcoind: Option<Bitcoind>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Xrpl {
    pub network: Option<ledger::Xrpl>,
    pub node_url: Option<Url>,
    pub address: Option<AccountId>,
    pub secret: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Swap {
    pub safety_margin_secs: Option<u64>,
    pub min_confirmations: Option<u32>,
    pub poll_interval_secs: Option<u64>,
}

impl File {
    pub fn read(config_file: &Path) -> Result<Self, config_rs::ConfigError> {
        config_rs::Config::builder()
            .add_source(config_rs::File::from(config_file))
            .build()?
            .try_deserialize()
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Logging {
    pub level: Option<Level>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum Level {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LevelFilter> for Level {
    fn from(level: LevelFilter) -> Self {
        if level == LevelFilter::OFF {
            Level::Off
        } else if level == LevelFilter::ERROR {
            Level::Error
        } else if level == LevelFilter::WARN {
            Level::Warn
        } else if level == LevelFilter::INFO {
            Level::Info
        } else if level == LevelFilter::DEBUG {
            Level::Debug
        } else {
            Level::Trace
        }
    }
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}
