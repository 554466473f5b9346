use crate::{
    config::{File, Settings},
    database::Database,
    swap::Dependencies,
};
use anyhow::Context;
use std::{path::PathBuf, sync::Arc};
use structopt::StructOpt;
use xcswap::connectors::{BitcoindConnector, RippledConnector};

mod initiate;
mod new_keys;
mod respond;
mod resume;

pub use initiate::initiate;
pub use new_keys::new_keys;
pub use respond::respond;
pub use resume::resume;

#[derive(StructOpt, Debug)]
pub struct Options {
    /// Path to configuration file
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config_file: Option<PathBuf>,

    /// Commands available
    #[structopt(subcommand)]
    pub cmd: Command,
}

impl Options {
    pub fn from_args() -> Self {
        StructOpt::from_args()
    }
}

#[derive(StructOpt, Debug, Clone)]
pub enum Command {
    /// Generate a secret, print the offer for the terms and execute the swap
    Initiate {
        #[structopt(parse(from_os_str))]
        terms: PathBuf,
    },
    /// Execute the responder side of an offer
    Respond {
        #[structopt(parse(from_os_str))]
        terms: PathBuf,
        #[structopt(parse(from_os_str))]
        offer: PathBuf,
    },
    /// Resume every swap that has not ended yet
    Resume,
    /// Print a fresh bitcoin key and XRPL wallet
    NewKeys,
    /// Dump the current configuration
    DumpConfig,
}

pub fn dump_config(settings: Settings) -> anyhow::Result<()> {
    let file = File::from(settings);
    let serialized = toml::to_string(&file)?;
    println!("{}", serialized);
    Ok(())
}

type Connected = Dependencies<BitcoindConnector, RippledConnector>;

/// Connects to both nodes and opens the database.
async fn connect(settings: Settings) -> anyhow::Result<Connected> {
    let key_pair = settings.bitcoin.key_pair()?;
    let wallet = settings.xrpl.wallet()?;

    let bitcoin = BitcoindConnector::new(
        settings.bitcoin.bitcoind.node_url.clone(),
        settings.bitcoin.bitcoind.credentials(),
    );
    let chain = bitcoin
        .chain_info()
        .await
        .context("could not reach bitcoind")?
        .chain;
    if chain != settings.bitcoin.network {
        anyhow::bail!(
            "bitcoind runs on {} but the configuration expects {}",
            chain,
            settings.bitcoin.network
        );
    }
    let xrpl = RippledConnector::new(settings.xrpl.node_url.clone());

    #[cfg(not(test))]
    let db = {
        let path = settings.data.dir.join("database");
        crate::fs::ensure_directory_exists(&path)?;
        Database::new(&path)?
    };
    #[cfg(test)]
    let db = Database::new_test()?;

    Ok(Dependencies {
        settings,
        bitcoin: Arc::new(bitcoin),
        xrpl: Arc::new(xrpl),
        key_pair,
        wallet,
        db: Arc::new(db),
    })
}
