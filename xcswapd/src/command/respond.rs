use crate::{
    command::connect,
    config::Settings,
    swap::SwapRecord,
    terms::{Offer, Terms},
};
use std::path::Path;
use xcswap::Role;

pub async fn respond(settings: Settings, terms: &Path, offer: &Path) -> anyhow::Result<()> {
    let terms = Terms::read(terms)?;
    let offer = Offer::read(offer)?;
    let deps = connect(settings).await?;
    terms.check_identities(Role::Responder, &deps.key_pair, &deps.wallet)?;

    let record = SwapRecord {
        role: Role::Responder,
        terms,
        offer,
        secret: None,
    };

    deps.db.insert_swap(&record).await?;
    tracing::info!("responding to swap {}", offer.swap_id);

    let state = deps.execute(offer.swap_id, record).await?;
    println!("swap {} ended in {}", offer.swap_id, state);

    Ok(())
}
