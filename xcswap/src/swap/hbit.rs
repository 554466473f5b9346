use crate::{
    bitcoin::{
        classify_reject_reason, confirmations, BitcoinLedger, BroadcastError, KeyPair,
        RejectReason,
    },
    error::{Chain, Error, RejectionKind, Violation},
    hbit::{self, Funded, Spend},
    swap::{Leg, TimeoutPolicy},
    timelock::RelativeTimelock,
    Secret,
};
use async_trait::async_trait;
use bitcoin::{Address, Amount, Transaction};
use std::{sync::Arc, time::Duration};

/// The HTLC leg of a swap, driven with one party's key.
///
/// The key is the claim identity for the party that receives the bitcoin
/// and the refund identity for the party that locks it. Claims and refunds
/// pay to the key's own address.
#[derive(Debug)]
pub struct BitcoinLeg<L> {
    params: hbit::Params,
    key_pair: KeyPair,
    ledger: Arc<L>,
    fee: Amount,
    block_interval: Duration,
    policy: TimeoutPolicy,
}

impl<L> BitcoinLeg<L>
where
    L: BitcoinLedger,
{
    pub fn new(
        params: hbit::Params,
        key_pair: KeyPair,
        ledger: Arc<L>,
        fee: Amount,
        block_interval: Duration,
        policy: TimeoutPolicy,
    ) -> Self {
        Self {
            params,
            key_pair,
            ledger,
            fee,
            block_interval,
            policy,
        }
    }

    pub fn params(&self) -> &hbit::Params {
        &self.params
    }

    fn destination(&self) -> Address {
        self.key_pair.address(self.params.network.into())
    }

    async fn broadcast(&self, transaction: Transaction) -> Result<(), Error> {
        let txid = transaction.compute_txid();

        match self.ledger.submit_raw_transaction(&transaction).await {
            Ok(txid) => {
                tracing::info!("broadcast {}", txid);
                Ok(())
            }
            Err(BroadcastError::Connection(e)) => Err(Error::connection(Chain::Bitcoin, e)),
            Err(BroadcastError::Rejected(reason)) => match classify_reject_reason(&reason) {
                RejectReason::AlreadyKnown => {
                    tracing::info!("{} was already broadcast", txid);
                    Ok(())
                }
                RejectReason::Rejected(kind) => Err(Error::rejected(Chain::Bitcoin, kind, reason)),
            },
        }
    }

    /// How the HTLC output was spent, `None` while it is unspent.
    async fn spend(&self, funded: &Funded) -> Result<Option<Spend>, Error> {
        let observed = self
            .ledger
            .find_spending_transaction(funded.location, funded.height)
            .await
            .map_err(connection)?;

        match observed {
            Some(observed) => hbit::classify_spend(&observed.transaction, funded.location)
                .map(Some)
                .map_err(|e| Error::extraction(Chain::Bitcoin, e)),
            None => Ok(None),
        }
    }

    /// Turns a double spend into success if the competing spend is the one
    /// we attempted.
    async fn settled_as(&self, funded: &Funded, error: Error, claimed: bool) -> Result<(), Error> {
        if error.rejection_kind() != Some(RejectionKind::DoubleSpend) {
            return Err(error);
        }

        match self.spend(funded).await? {
            Some(Spend::Claimed(_)) if claimed => Ok(()),
            Some(Spend::Refunded) if !claimed => Ok(()),
            _ => Err(error),
        }
    }
}

#[async_trait]
impl<L> Leg for BitcoinLeg<L>
where
    L: BitcoinLedger,
{
    type Lock = Funded;

    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn lock(&self) -> Result<Funded, Error> {
        let address = self.params.compute_address()?;

        let existing = self
            .ledger
            .fetch_unspent_output(&address)
            .await
            .map_err(connection)?;
        if existing.is_none() {
            let txid = self
                .ledger
                .send_to_address(&address, self.params.asset)
                .await
                .map_err(connection)?;
            tracing::info!("funded {} with {} in {}", address, self.params.asset, txid);
        }

        loop {
            let utxo = self
                .ledger
                .fetch_unspent_output(&address)
                .await
                .map_err(connection)?;

            if let Some(utxo) = utxo {
                if let Some(height) = utxo.height {
                    return Ok(Funded {
                        location: utxo.outpoint,
                        asset: utxo.amount,
                        height,
                    });
                }
            }

            tracing::debug!("waiting for funding of {} to confirm", address);
            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    async fn find_lock(&self) -> Result<Option<Funded>, Error> {
        let address = self.params.compute_address()?;

        let utxo = match self
            .ledger
            .fetch_unspent_output(&address)
            .await
            .map_err(connection)?
        {
            Some(utxo) => utxo,
            None => return Ok(None),
        };
        let tip = self.ledger.block_height().await.map_err(connection)?;

        let height = match utxo.height {
            Some(height) if confirmations(tip, Some(height)) >= self.policy.min_confirmations => {
                height
            }
            _ => {
                tracing::debug!(
                    "{} has {} of {} confirmations",
                    utxo.outpoint,
                    confirmations(tip, utxo.height),
                    self.policy.min_confirmations
                );
                return Ok(None);
            }
        };

        if utxo.amount != self.params.asset {
            return Err(Error::violation(
                Chain::Bitcoin,
                Violation::AmountMismatch {
                    expected: self.params.asset.to_string(),
                    actual: utxo.amount.to_string(),
                },
            ));
        }

        Ok(Some(Funded {
            location: utxo.outpoint,
            asset: utxo.amount,
            height,
        }))
    }

    async fn time_until_refundable(&self, funded: &Funded) -> Result<Duration, Error> {
        let tip = self.ledger.block_height().await.map_err(connection)?;

        match self.params.timelock {
            // A refund can be mined in the block after the tip.
            RelativeTimelock::Blocks(blocks) => {
                let remaining = (funded.height + u32::from(blocks)).saturating_sub(tip + 1);

                Ok(self.block_interval * remaining)
            }
            RelativeTimelock::Seconds(seconds) => {
                let start = self
                    .ledger
                    .median_time_past(funded.height.saturating_sub(1))
                    .await
                    .map_err(connection)?;
                let now = self
                    .ledger
                    .median_time_past(tip)
                    .await
                    .map_err(connection)?;

                Ok(Duration::from_secs(u64::from(
                    now.seconds_until(start.plus(seconds)),
                )))
            }
        }
    }

    fn lock_duration(&self) -> Duration {
        self.params.timelock.duration(self.block_interval)
    }

    async fn claim(&self, funded: &Funded, secret: Secret) -> Result<(), Error> {
        let transaction = self.params.build_claim_transaction(
            funded,
            self.key_pair,
            secret,
            self.destination(),
            self.fee,
        )?;

        match self.broadcast(transaction).await {
            Ok(()) => Ok(()),
            Err(e) => self.settled_as(funded, e, true).await,
        }
    }

    async fn revealed_secret(&self, funded: &Funded) -> Result<Option<Secret>, Error> {
        match self.spend(funded).await? {
            Some(Spend::Claimed(secret)) if self.params.secret_hash.is_unlocked_by(&secret) => {
                Ok(Some(secret))
            }
            Some(Spend::Claimed(_)) => {
                Err(Error::violation(Chain::Bitcoin, Violation::HashMismatch))
            }
            Some(Spend::Refunded) | None => Ok(None),
        }
    }

    async fn refund(&self, funded: &Funded) -> Result<(), Error> {
        let transaction = self.params.build_refund_transaction(
            funded,
            self.key_pair,
            self.destination(),
            self.fee,
        )?;

        match self.broadcast(transaction).await {
            Ok(()) => Ok(()),
            Err(e) => self.settled_as(funded, e, false).await,
        }
    }

    async fn is_consumed(&self, funded: &Funded) -> Result<bool, Error> {
        self.ledger
            .is_unspent(funded.location)
            .await
            .map(|unspent| !unspent)
            .map_err(connection)
    }
}

fn connection(e: anyhow::Error) -> Error {
    Error::connection(Chain::Bitcoin, e)
}
