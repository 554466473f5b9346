use crate::{
    error::{Chain, Error, RejectionKind},
    escrow::{self, Created},
    swap::{Leg, TimeoutPolicy},
    xrpl::{Wallet, XrplLedger},
    Fulfillment, RippleTime, Secret,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

/// Polls before a submitted transaction counts as lost.
const VALIDATION_ATTEMPTS: u32 = 120;

/// The escrow leg of a swap, driven with one party's wallet.
///
/// The owner's wallet creates and cancels, the destination's wallet
/// finishes. The ledger accepts finishes and cancels from any account.
#[derive(Debug)]
pub struct XrplLeg<L> {
    params: escrow::Params,
    wallet: Wallet,
    ledger: Arc<L>,
    policy: TimeoutPolicy,
}

impl<L> XrplLeg<L>
where
    L: XrplLedger,
{
    pub fn new(
        params: escrow::Params,
        wallet: Wallet,
        ledger: Arc<L>,
        policy: TimeoutPolicy,
    ) -> Self {
        Self {
            params,
            wallet,
            ledger,
            policy,
        }
    }

    pub fn params(&self) -> &escrow::Params {
        &self.params
    }

    async fn wait_until_validated(&self, tx_hash: &str) -> Result<(), Error> {
        for _ in 0..VALIDATION_ATTEMPTS {
            let validated = self
                .ledger
                .validated_transaction(tx_hash)
                .await
                .map_err(connection)?;

            if let Some(validated) = validated {
                return escrow::classify_engine_result(&validated.engine_result).map_err(|kind| {
                    Error::rejected(Chain::Xrpl, kind, validated.engine_result.as_str())
                });
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }

        Err(connection(anyhow::anyhow!(
            "{} did not make it into a validated ledger",
            tx_hash
        )))
    }

    /// Whether a settled escrow was finished, as opposed to cancelled.
    async fn was_finished(&self, created: &Created) -> Result<bool, Error> {
        escrow::revealed_secret(&*self.ledger, created, self.params.condition)
            .await
            .map(|secret| secret.is_some())
    }
}

#[async_trait]
impl<L> Leg for XrplLeg<L>
where
    L: XrplLedger,
{
    type Lock = Created;

    fn chain(&self) -> Chain {
        Chain::Xrpl
    }

    async fn lock(&self) -> Result<Created, Error> {
        if let Some((created, _)) = escrow::find_escrow(&*self.ledger, &self.params).await? {
            tracing::info!("escrow {} already exists", created.tx_hash);
            return Ok(created);
        }

        let created =
            escrow::create_escrow(&*self.ledger, &self.wallet, self.params.clone()).await?;
        self.wait_until_validated(&created.tx_hash).await?;

        Ok(created)
    }

    async fn find_lock(&self) -> Result<Option<Created>, Error> {
        match escrow::find_escrow(&*self.ledger, &self.params).await? {
            Some((created, entry)) => {
                escrow::verify_entry(&self.params, &entry)
                    .map_err(|violation| Error::violation(Chain::Xrpl, violation))?;

                Ok(Some(created))
            }
            None => Ok(None),
        }
    }

    // Cancelling needs a ledger closed strictly after CancelAfter.
    async fn time_until_refundable(&self, _: &Created) -> Result<Duration, Error> {
        let close_time = self.ledger.ledger_close_time().await.map_err(connection)?;

        if close_time > self.params.cancel_after {
            return Ok(Duration::from_secs(0));
        }

        Ok(Duration::from_secs(
            u64::from(close_time.seconds_until(self.params.cancel_after)) + 1,
        ))
    }

    fn lock_duration(&self) -> Duration {
        Duration::from_secs(u64::from(
            RippleTime::now().seconds_until(self.params.cancel_after),
        ))
    }

    async fn claim(&self, created: &Created, secret: Secret) -> Result<(), Error> {
        let fulfillment = Fulfillment::from(secret);

        let result = escrow::finish_escrow(
            &*self.ledger,
            &self.wallet,
            created,
            self.params.condition,
            fulfillment,
        )
        .await;

        let error = match result {
            Ok(tx_hash) => return self.wait_until_validated(&tx_hash).await,
            Err(error) => error,
        };

        if error.rejection_kind() == Some(RejectionKind::AlreadySettled)
            && self.was_finished(created).await?
        {
            tracing::info!("escrow {} was already finished", created.offer_sequence);
            return Ok(());
        }

        Err(error)
    }

    async fn revealed_secret(&self, created: &Created) -> Result<Option<Secret>, Error> {
        escrow::revealed_secret(&*self.ledger, created, self.params.condition).await
    }

    async fn refund(&self, created: &Created) -> Result<(), Error> {
        let error = match escrow::cancel_escrow(&*self.ledger, &self.wallet, created).await {
            Ok(tx_hash) => return self.wait_until_validated(&tx_hash).await,
            Err(error) => error,
        };

        if error.rejection_kind() == Some(RejectionKind::AlreadySettled)
            && !self.was_finished(created).await?
        {
            tracing::info!("escrow {} was already cancelled", created.offer_sequence);
            return Ok(());
        }

        Err(error)
    }

    async fn is_consumed(&self, created: &Created) -> Result<bool, Error> {
        self.ledger
            .escrow_entry(&created.owner, created.offer_sequence)
            .await
            .map(|entry| entry.is_none())
            .map_err(connection)
    }
}

fn connection(e: anyhow::Error) -> Error {
    Error::connection(Chain::Xrpl, e)
}
