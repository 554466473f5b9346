use crate::{
    command::connect,
    config::Settings,
    swap::SwapRecord,
    terms::{Offer, Terms},
};
use anyhow::Context;
use std::path::Path;
use xcswap::{xrpl::XrplLedger, Role, SecretLock, SwapId};

pub async fn initiate(settings: Settings, terms: &Path) -> anyhow::Result<()> {
    let terms = Terms::read(terms)?;
    let deps = connect(settings).await?;
    terms.check_identities(Role::Initiator, &deps.key_pair, &deps.wallet)?;

    let lock = SecretLock::generate().context("could not generate a secret")?;
    let close_time = deps
        .xrpl
        .ledger_close_time()
        .await
        .context("could not read the XRPL close time")?;
    let offer = Offer {
        swap_id: SwapId::default(),
        secret_hash: lock.secret_hash,
        cancel_after: close_time.plus(terms.xrp.timeout_secs),
    };
    let record = SwapRecord {
        role: Role::Initiator,
        terms,
        offer,
        secret: Some(lock.secret),
    };

    deps.db.insert_swap(&record).await?;
    tracing::info!("initiated swap {}", offer.swap_id);
    println!("{}", serde_json::to_string_pretty(&offer)?);

    let state = deps.execute(offer.swap_id, record).await?;
    println!("swap {} ended in {}", offer.swap_id, state);

    Ok(())
}
