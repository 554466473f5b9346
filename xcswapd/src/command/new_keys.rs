use crate::config::Settings;
use anyhow::Context;
use xcswap::{bitcoin::KeyPair, connectors::RippledConnector, xrpl::XrplLedger};

pub async fn new_keys(settings: Settings) -> anyhow::Result<()> {
    let network = settings.bitcoin.network.into();
    let key_pair = KeyPair::random(network).context("could not generate a bitcoin key")?;

    println!("[bitcoin]");
    println!("private_key = \"{}\"", key_pair.to_wif());
    println!("# public key {}", key_pair.public_key());
    println!("# address {}", key_pair.address(network));

    let wallet = RippledConnector::new(settings.xrpl.node_url)
        .wallet_propose()
        .await
        .context("rippled could not propose a wallet")?;

    println!();
    println!("[xrpl]");
    println!("address = \"{}\"", wallet.address);
    println!("secret = \"{}\"", wallet.secret);

    Ok(())
}
