use crate::{
    config::Settings,
    database::Database,
    terms::{Direction, Offer, Terms},
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use xcswap::{
    bitcoin::{BitcoinLedger, KeyPair},
    swap::{BitcoinLeg, Leg, Load, Save, Swap, SwapState, XrplLeg},
    xrpl::{Wallet, XrplLedger},
    Role, Secret, SwapId,
};

/// Everything needed to (re)start one party's side of a swap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub role: Role,
    pub terms: Terms,
    pub offer: Offer,
    /// Only the initiator knows the secret up front.
    pub secret: Option<Secret>,
}

/// The ledgers and identities our side of every swap runs with.
#[derive(Debug)]
pub struct Dependencies<B, X> {
    pub settings: Settings,
    pub bitcoin: Arc<B>,
    pub xrpl: Arc<X>,
    pub key_pair: KeyPair,
    pub wallet: Wallet,
    pub db: Arc<Database>,
}

impl<B, X> Dependencies<B, X>
where
    B: BitcoinLedger,
    X: XrplLedger,
{
    /// Runs the swap `swap_id` until it ended and returns the name of its
    /// final state.
    pub async fn execute(&self, swap_id: SwapId, record: SwapRecord) -> anyhow::Result<String> {
        record
            .terms
            .check_identities(record.role, &self.key_pair, &self.wallet)?;

        let bitcoin = BitcoinLeg::new(
            record
                .terms
                .hbit_params(self.settings.bitcoin.network, record.offer.secret_hash)?,
            self.key_pair,
            self.bitcoin.clone(),
            self.settings.bitcoin.fee,
            self.settings.bitcoin.block_interval,
            self.settings.swap,
        );
        let xrpl = XrplLeg::new(
            record.terms.escrow_params(&record.offer),
            self.wallet.clone(),
            self.xrpl.clone(),
            self.settings.swap,
        );

        match record.terms.direction {
            Direction::EscrowHbit => self.run(swap_id, &record, xrpl, bitcoin).await,
            Direction::HbitEscrow => self.run(swap_id, &record, bitcoin, xrpl).await,
        }
    }

    async fn run<A, Z>(
        &self,
        swap_id: SwapId,
        record: &SwapRecord,
        alpha: A,
        beta: Z,
    ) -> anyhow::Result<String>
    where
        A: Leg,
        Z: Leg,
        Database: Load<SwapState<A, Z>> + Save<SwapState<A, Z>>,
    {
        let policy = self.settings.swap;
        let db = self.db.clone();

        let swap = match (record.role, record.secret) {
            (Role::Initiator, Some(secret)) => {
                Swap::initiator(swap_id, secret, alpha, beta, policy, db)
            }
            (Role::Initiator, None) => {
                anyhow::bail!("swap {} was initiated without a secret", swap_id)
            }
            (Role::Responder, _) => Swap::responder(swap_id, alpha, beta, policy, db),
        };

        let state = swap
            .run()
            .await
            .with_context(|| format!("swap {} failed", swap_id))?;
        tracing::info!("swap {} ended in {}", swap_id, state);

        Ok(state.to_string())
    }
}
