use crate::config::{file, Bitcoind, Data, File};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use url::Url;
use xcswap::{
    bitcoin::KeyPair, export::bitcoin::Amount, jsonrpc::Credentials, ledger, swap::TimeoutPolicy,
    xrpl::Wallet,
};

/// The effective configuration: the file merged with defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub data: Data,
    pub logging: Logging,
    pub bitcoin: Bitcoin,
    pub xrpl: Xrpl,
    pub swap: TimeoutPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Logging {
    pub level: LevelFilter,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bitcoin {
    pub network: ledger::Bitcoin,
    pub bitcoind: Bitcoind,
    pub fee: Amount,
    pub block_interval: Duration,
    pub key_pair: Option<KeyPair>,
}

const DEFAULT_FEE: Amount = Amount::from_sat(1_000);
const DEFAULT_BLOCK_INTERVAL: Duration = Duration::from_secs(600);

impl Bitcoin {
    pub fn default_from_network(network: ledger::Bitcoin) -> Self {
        Self {
            network,
            bitcoind: Bitcoind::new(network),
            fee: DEFAULT_FEE,
            block_interval: DEFAULT_BLOCK_INTERVAL,
            key_pair: None,
        }
    }

    fn from_file(bitcoin: file::Bitcoin) -> Result<Self> {
        let network = bitcoin.network.unwrap_or_default();
        let key_pair = bitcoin
            .private_key
            .map(|wif| KeyPair::from_wif(&wif))
            .transpose()
            .context("bitcoin.private_key is not a valid WIF")?;

        Ok(Self {
            network,
            bitcoind: bitcoin.bitcoind.unwrap_or_else(|| Bitcoind::new(network)),
            fee: bitcoin.fee_sat.map_or(DEFAULT_FEE, Amount::from_sat),
            block_interval: bitcoin
                .block_interval_secs
                .map_or(DEFAULT_BLOCK_INTERVAL, Duration::from_secs),
            key_pair,
        })
    }

    pub fn key_pair(&self) -> Result<KeyPair> {
        self.key_pair
            .context("no bitcoin.private_key configured, create one with `xcswapd new-keys`")
    }
}

impl From<Bitcoin> for file::Bitcoin {
    fn from(bitcoin: Bitcoin) -> Self {
        file::Bitcoin {
            network: Some(bitcoin.network),
            fee_sat: Some(bitcoin.fee.to_sat()),
            block_interval_secs: Some(bitcoin.block_interval.as_secs()),
            private_key: bitcoin.key_pair.map(|key_pair| key_pair.to_wif()),
            bitcoind: Some(bitcoin.bitcoind),
        }
    }
}

impl Bitcoind {
    fn new(network: ledger::Bitcoin) -> Self {
        let node_url = match network {
            ledger::Bitcoin::Mainnet => static_url("http://localhost:8332"),
            ledger::Bitcoin::Testnet => static_url("http://localhost:18332"),
            ledger::Bitcoin::Regtest => static_url("http://localhost:18443"),
        };

        Bitcoind {
            node_url,
            username: None,
            password: None,
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Xrpl {
    pub network: ledger::Xrpl,
    pub node_url: Url,
    pub wallet: Option<Wallet>,
}

impl Xrpl {
    fn from_file(xrpl: file::Xrpl) -> Result<Self> {
        let network = xrpl.network.unwrap_or_default();
        let wallet = match (xrpl.address, xrpl.secret) {
            (Some(address), Some(secret)) => Some(Wallet {
                address,
                secret,
                public_key: None,
            }),
            (None, None) => None,
            _ => anyhow::bail!("xrpl.address and xrpl.secret must be configured together"),
        };

        Ok(Self {
            network,
            node_url: xrpl.node_url.unwrap_or_else(|| default_rippled(network)),
            wallet,
        })
    }

    pub fn wallet(&self) -> Result<Wallet> {
        self.wallet
            .clone()
            .context(
                "no xrpl.address and xrpl.secret configured, create them with `xcswapd new-keys`",
            )
    }
}

impl Default for Xrpl {
    fn default() -> Self {
        let network = ledger::Xrpl::default();

        Self {
            network,
            node_url: default_rippled(network),
            wallet: None,
        }
    }
}

impl From<Xrpl> for file::Xrpl {
    fn from(xrpl: Xrpl) -> Self {
        let (address, secret) = match xrpl.wallet {
            Some(wallet) => (Some(wallet.address), Some(wallet.secret)),
            None => (None, None),
        };

        file::Xrpl {
            network: Some(xrpl.network),
            node_url: Some(xrpl.node_url),
            address,
            secret,
        }
    }
}

fn default_rippled(network: ledger::Xrpl) -> Url {
    match network {
        ledger::Xrpl::Mainnet => static_url("https://s1.ripple.com:51234"),
        ledger::Xrpl::Testnet => static_url("https://s.altnet.rippletest.net:51234"),
        ledger::Xrpl::Devnet => static_url("https://s.devnet.rippletest.net:51234"),
    }
}

fn static_url(url: &str) -> Url {
    Url::parse(url).expect("static string to be a valid url")
}

fn policy_from_file(swap: file::Swap) -> TimeoutPolicy {
    let defaults = TimeoutPolicy::default();

    TimeoutPolicy {
        safety_margin: swap
            .safety_margin_secs
            .map_or(defaults.safety_margin, Duration::from_secs),
        min_confirmations: swap.min_confirmations.unwrap_or(defaults.min_confirmations),
        poll_interval: swap
            .poll_interval_secs
            .map_or(defaults.poll_interval, Duration::from_secs),
    }
}

impl From<TimeoutPolicy> for file::Swap {
    fn from(policy: TimeoutPolicy) -> Self {
        file::Swap {
            safety_margin_secs: Some(policy.safety_margin.as_secs()),
            min_confirmations: Some(policy.min_confirmations),
            poll_interval_secs: Some(policy.poll_interval.as_secs()),
        }
    }
}

impl From<Settings> for File {
    fn from(settings: Settings) -> Self {
        let Settings {
            data,
            logging: Logging { level },
            bitcoin,
            xrpl,
            swap,
        } = settings;

        File {
            data: Some(data),
            logging: Some(file::Logging {
                level: Some(level.into()),
            }),
            bitcoin: Some(bitcoin.into()),
            xrpl: Some(xrpl.into()),
            swap: Some(swap.into()),
        }
    }
}

impl Settings {
    pub fn from_config_file_and_defaults(config_file: File) -> Result<Self> {
        let File {
            data,
            logging,
            bitcoin,
            xrpl,
            swap,
        } = config_file;

        Ok(Self {
            data: match data {
                Some(data) => data,
                None => Data {
                    dir: crate::fs::data_dir().context("unable to determine default data path")?,
                },
            },
            logging: match logging {
                Some(file::Logging { level: Some(level) }) => Logging {
                    level: level.into(),
                },
                _ => Logging::default(),
            },
            bitcoin: match bitcoin {
                Some(bitcoin) => Bitcoin::from_file(bitcoin)?,
                None => Bitcoin::default_from_network(ledger::Bitcoin::default()),
            },
            xrpl: match xrpl {
                Some(xrpl) => Xrpl::from_file(xrpl)?,
                None => Xrpl::default(),
            },
            swap: swap.map_or_else(TimeoutPolicy::default, policy_from_file),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;

    #[test]
    fn logging_section_defaults_to_info() {
        let config_file = File {
            logging: None,
            ..File::default()
        };

        let settings = Settings::from_config_file_and_defaults(config_file);

        assert_that!(settings)
            .is_ok()
            .map(|settings| &settings.logging)
            .is_equal_to(Logging {
                level: LevelFilter::INFO,
            })
    }

    #[test]
    fn bitcoin_defaults_to_local_regtest_node() {
        let settings = Settings::from_config_file_and_defaults(File::default());

        assert_that!(settings)
            .is_ok()
            .map(|settings| &settings.bitcoin)
            .is_equal_to(Bitcoin {
                network: ledger::Bitcoin::Regtest,
                bitcoind: Bitcoind {
                    node_url: "http://localhost:18443".parse().unwrap(),
                    username: None,
                    password: None,
                },
                fee: Amount::from_sat(1_000),
                block_interval: Duration::from_secs(600),
                key_pair: None,
            })
    }

    #[test]
    fn bitcoind_url_follows_configured_network() {
        let config_file = File {
            bitcoin: Some(file::Bitcoin {
                network: Some(ledger::Bitcoin::Testnet),
                ..file::Bitcoin::default()
            }),
            ..File::default()
        };

        let settings = Settings::from_config_file_and_defaults(config_file).unwrap();

        assert_that!(settings.bitcoin.bitcoind.node_url.as_str())
            .is_equal_to("http://localhost:18332/");
    }

    #[test]
    fn xrpl_defaults_to_public_testnet() {
        let settings = Settings::from_config_file_and_defaults(File::default()).unwrap();

        assert_that!(settings.xrpl.node_url.as_str())
            .is_equal_to("https://s.altnet.rippletest.net:51234/");
        assert_that!(settings.xrpl.wallet()).is_err();
    }

    #[test]
    fn half_configured_wallet_is_an_error() {
        let config_file = File {
            xrpl: Some(file::Xrpl {
                address: Some("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh".parse().unwrap()),
                ..file::Xrpl::default()
            }),
            ..File::default()
        };

        assert_that!(Settings::from_config_file_and_defaults(config_file)).is_err();
    }

    #[test]
    fn invalid_wif_is_an_error() {
        let config_file = File {
            bitcoin: Some(file::Bitcoin {
                private_key: Some("not a key".to_owned()),
                ..file::Bitcoin::default()
            }),
            ..File::default()
        };

        assert_that!(Settings::from_config_file_and_defaults(config_file)).is_err();
    }

    #[test]
    fn swap_section_overrides_policy() {
        let config_file = File {
            swap: Some(file::Swap {
                safety_margin_secs: Some(120),
                min_confirmations: None,
                poll_interval_secs: Some(1),
            }),
            ..File::default()
        };

        let settings = Settings::from_config_file_and_defaults(config_file).unwrap();

        assert_that!(settings.swap.safety_margin).is_equal_to(Duration::from_secs(120));
        assert_that!(settings.swap.min_confirmations)
            .is_equal_to(TimeoutPolicy::default().min_confirmations);
        assert_that!(settings.swap.poll_interval).is_equal_to(Duration::from_secs(1));
    }

    #[test]
    fn settings_survive_a_round_trip_through_the_file() {
        let config_file = File {
            bitcoin: Some(file::Bitcoin {
                private_key: Some(
                    "cScfkGjbzzoeewVWmU2hYPUHeVGJRDdFt7WhmrVVGkxpmPP8BHWe".to_owned(),
                ),
                ..file::Bitcoin::default()
            }),
            data: Some(Data {
                dir: "/tmp/xcswapd".into(),
            }),
            ..File::default()
        };
        let settings = Settings::from_config_file_and_defaults(config_file).unwrap();

        let round_tripped = Settings::from_config_file_and_defaults(File::from(settings.clone()));

        assert_that!(round_tripped).is_ok_containing(settings);
    }
}
