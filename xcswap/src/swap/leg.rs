use crate::{Chain, Error, Secret};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, time::Duration};

/// One side of a swap: a lock on one ledger under the swap's hash
/// commitment, seen from the party running the swap.
///
/// The same leg is used by both parties. Whoever locks calls [`Leg::lock`]
/// and later [`Leg::refund`], the counterparty calls [`Leg::find_lock`] and
/// [`Leg::claim`].
#[async_trait]
pub trait Leg: Send + Sync + 'static {
    type Lock: Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static;

    fn chain(&self) -> Chain;

    /// Locks the asset and returns once the lock is confirmed. Returns the
    /// existing lock if there already is one.
    async fn lock(&self) -> Result<Self::Lock, Error>;

    /// Looks for the counterparty's lock and verifies it against the agreed
    /// parameters. `Ok(None)` while there is no sufficiently confirmed lock.
    async fn find_lock(&self) -> Result<Option<Self::Lock>, Error>;

    /// Time until the lock can be refunded, zero once it can.
    async fn time_until_refundable(&self, lock: &Self::Lock) -> Result<Duration, Error>;

    /// How long a lock created now stays unrefundable.
    fn lock_duration(&self) -> Duration;

    /// Claims the lock by revealing `secret`. Succeeds as well if the lock
    /// was already claimed.
    async fn claim(&self, lock: &Self::Lock, secret: Secret) -> Result<(), Error>;

    /// The secret revealed by a claim of `lock`, `Ok(None)` if it was not
    /// claimed yet.
    async fn revealed_secret(&self, lock: &Self::Lock) -> Result<Option<Secret>, Error>;

    /// Refunds the lock to its owner. Succeeds as well if the lock was
    /// already refunded.
    async fn refund(&self, lock: &Self::Lock) -> Result<(), Error>;

    /// Whether the lock was claimed or refunded.
    async fn is_consumed(&self, lock: &Self::Lock) -> Result<bool, Error>;
}
