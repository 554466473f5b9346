//! Execute a swap.
//!
//! A swap is an explicit state machine over two [`Leg`]s. The alpha leg is
//! locked first by the initiator with the longer timeout, the beta leg second
//! by the responder. Every transition is persisted before the next step runs,
//! so a restarted party resumes from its last durable state instead of
//! repeating side effects.

mod escrow;
mod hbit;
mod leg;

pub use self::{escrow::XrplLeg, hbit::BitcoinLeg, leg::Leg};

use crate::{Disposition, Error, Role, Secret, SwapId};
use backoff::backoff::Constant;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use tracing_futures::Instrument;

/// Reads the persisted value of type `T` of a swap.
pub trait Load<T>: Send + Sync + 'static {
    fn load(&self, swap_id: SwapId) -> anyhow::Result<Option<T>>;
}

/// Durably replaces the persisted value of type `T` of a swap.
#[async_trait::async_trait]
pub trait Save<T>: Send + Sync + 'static {
    async fn save(&self, elem: T, swap_id: SwapId) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, strum_macros::Display)]
pub enum State<A, B> {
    Init,
    InitiatorLocked {
        alpha: A,
    },
    ResponderLocked {
        alpha: A,
        beta: B,
    },
    SecretRevealed {
        alpha: A,
        beta: B,
        secret: Secret,
    },
    BothSettled {
        alpha: A,
        beta: B,
        secret: Secret,
    },
    /// The party waits for its own lock to become refundable. `beta` is
    /// `None` if the responder never locked.
    TimedOutRefunding {
        alpha: A,
        beta: Option<B>,
    },
    Refunded {
        alpha: A,
        beta: Option<B>,
    },
    /// The swap ended without the party's funds being locked, or with an
    /// outcome that needs manual attention.
    Abandoned {
        reason: String,
    },
}

impl<A, B> State<A, B> {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::BothSettled { .. } | State::Refunded { .. } | State::Abandoned { .. }
        )
    }

    pub fn can_transition_to(&self, next: &State<A, B>) -> bool {
        use State::*;

        match (self, next) {
            (_, Abandoned { .. }) => !self.is_terminal(),
            (Init, InitiatorLocked { .. }) => true,
            (InitiatorLocked { .. }, ResponderLocked { .. })
            | (InitiatorLocked { .. }, TimedOutRefunding { .. }) => true,
            (ResponderLocked { .. }, SecretRevealed { .. })
            | (ResponderLocked { .. }, TimedOutRefunding { .. }) => true,
            (SecretRevealed { .. }, BothSettled { .. })
            | (SecretRevealed { .. }, TimedOutRefunding { .. }) => true,
            (TimedOutRefunding { .. }, Refunded { .. })
            | (TimedOutRefunding { .. }, ResponderLocked { .. })
            | (TimedOutRefunding { .. }, SecretRevealed { .. }) => true,
            _ => false,
        }
    }

    fn abandoned(reason: impl Into<String>) -> Self {
        State::Abandoned {
            reason: reason.into(),
        }
    }
}

pub type SwapState<A, B> = State<<A as Leg>::Lock, <B as Leg>::Lock>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Time a party needs at the very least to react to a revealed secret.
    pub safety_margin: Duration,
    /// Confirmations before a counterparty's Bitcoin lock is trusted.
    pub min_confirmations: u32,
    pub poll_interval: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(600),
            min_confirmations: 1,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// One party's view of a swap.
#[derive(Debug)]
pub struct Swap<A, B, D> {
    id: SwapId,
    role: Role,
    secret: Option<Secret>,
    alpha: A,
    beta: B,
    policy: TimeoutPolicy,
    db: Arc<D>,
}

impl<A, B, D> Swap<A, B, D>
where
    A: Leg,
    B: Leg,
    D: Load<SwapState<A, B>> + Save<SwapState<A, B>>,
{
    pub fn initiator(
        id: SwapId,
        secret: Secret,
        alpha: A,
        beta: B,
        policy: TimeoutPolicy,
        db: Arc<D>,
    ) -> Self {
        Self {
            id,
            role: Role::Initiator,
            secret: Some(secret),
            alpha,
            beta,
            policy,
            db,
        }
    }

    pub fn responder(id: SwapId, alpha: A, beta: B, policy: TimeoutPolicy, db: Arc<D>) -> Self {
        Self {
            id,
            role: Role::Responder,
            secret: None,
            alpha,
            beta,
            policy,
            db,
        }
    }

    pub fn id(&self) -> SwapId {
        self.id
    }

    /// Drives the swap until it reaches a terminal state and returns it.
    pub async fn run(self) -> anyhow::Result<SwapState<A, B>> {
        let span = tracing::info_span!("swap", id = %self.id, role = %self.role);

        self.execute().instrument(span).await
    }

    async fn execute(&self) -> anyhow::Result<SwapState<A, B>> {
        let mut state = self.db.load(self.id)?.unwrap_or(State::Init);

        if state.is_terminal() {
            tracing::info!("swap already ended in {}", state);
            return Ok(state);
        }
        if state != State::Init {
            tracing::info!("resuming swap in {}", state);
        }

        loop {
            let next = match (self.role, self.secret) {
                (Role::Initiator, Some(secret)) => {
                    self.initiator_step(state.clone(), secret).await
                }
                _ => self.responder_step(state.clone()).await,
            };

            anyhow::ensure!(
                state.can_transition_to(&next),
                "illegal transition from {} to {}",
                state,
                next
            );
            self.db.save(next.clone(), self.id).await?;
            tracing::info!("{} -> {}", state, next);

            if next.is_terminal() {
                return Ok(next);
            }
            state = next;
        }
    }

    async fn initiator_step(&self, state: SwapState<A, B>, secret: Secret) -> SwapState<A, B> {
        match state {
            State::Init => match self.retry(|| self.alpha.lock()).await {
                Ok(alpha) => State::InitiatorLocked { alpha },
                Err(e) => State::abandoned(format!(
                    "failed to lock on {}: {:#}",
                    self.alpha.chain(),
                    e
                )),
            },
            State::InitiatorLocked { alpha } => self.await_responder_lock(alpha).await,
            State::ResponderLocked { alpha, beta } => {
                match self.retry(|| self.beta.claim(&beta, secret)).await {
                    Ok(()) => State::SecretRevealed {
                        alpha,
                        beta,
                        secret,
                    },
                    Err(e) => {
                        tracing::warn!("failed to claim on {}: {:#}", self.beta.chain(), e);
                        State::TimedOutRefunding {
                            alpha,
                            beta: Some(beta),
                        }
                    }
                }
            }
            State::SecretRevealed {
                alpha,
                beta,
                secret,
            } => loop {
                match self.retry(|| self.alpha.is_consumed(&alpha)).await {
                    Ok(true) => {
                        return State::BothSettled {
                            alpha,
                            beta,
                            secret,
                        }
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!("failed to check own lock: {:#}", e),
                }
                if self.is_refundable(&self.alpha, &alpha).await {
                    tracing::warn!("responder did not claim before the timeout");
                    return State::TimedOutRefunding {
                        alpha,
                        beta: Some(beta),
                    };
                }

                tokio::time::sleep(self.policy.poll_interval).await;
            },
            State::TimedOutRefunding { alpha, beta } => {
                let error = match self.refund(&self.alpha, &alpha).await {
                    Ok(()) => return State::Refunded { alpha, beta },
                    Err(e) => e,
                };

                // Our lock was claimed, so the secret is out and our own claim
                // is still owed.
                if let Some(beta) = beta {
                    let consumed = self
                        .retry(|| self.beta.is_consumed(&beta))
                        .await
                        .unwrap_or(true);
                    if !consumed {
                        tracing::warn!("own lock was claimed, claiming the responder's lock");
                        return State::ResponderLocked { alpha, beta };
                    }
                }

                State::abandoned(format!("failed to refund: {:#}", error))
            }
            terminal => terminal,
        }
    }

    async fn await_responder_lock(&self, alpha: A::Lock) -> SwapState<A, B> {
        loop {
            match self.retry(|| self.beta.find_lock()).await {
                Ok(Some(beta)) => {
                    return match self.retry(|| self.beta.time_until_refundable(&beta)).await {
                        Ok(remaining) if remaining >= self.policy.safety_margin => {
                            State::ResponderLocked { alpha, beta }
                        }
                        Ok(remaining) => {
                            tracing::warn!(
                                "responder's lock is refundable in {:?}, refusing to claim",
                                remaining
                            );
                            State::TimedOutRefunding {
                                alpha,
                                beta: Some(beta),
                            }
                        }
                        Err(e) => {
                            tracing::warn!("failed to check responder's lock: {:#}", e);
                            State::TimedOutRefunding {
                                alpha,
                                beta: Some(beta),
                            }
                        }
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("responder's lock does not match the terms: {:#}", e);
                    return State::TimedOutRefunding { alpha, beta: None };
                }
            }

            if self.is_refundable(&self.alpha, &alpha).await {
                tracing::warn!("responder did not lock before the timeout");
                return State::TimedOutRefunding { alpha, beta: None };
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }

    async fn responder_step(&self, state: SwapState<A, B>) -> SwapState<A, B> {
        match state {
            State::Init => loop {
                match self.retry(|| self.alpha.find_lock()).await {
                    Ok(Some(alpha)) => return State::InitiatorLocked { alpha },
                    Ok(None) => {
                        // Give up once a lock created now would be refundable
                        // too soon to be accepted.
                        let required = self.beta.lock_duration() + self.policy.safety_margin;
                        if self.alpha.lock_duration() < required {
                            return State::abandoned(format!(
                                "initiator did not lock in time, a lock made now is refundable \
                                 in {:?}, at least {:?} required",
                                self.alpha.lock_duration(),
                                required
                            ));
                        }

                        tokio::time::sleep(self.policy.poll_interval).await
                    }
                    Err(e) => {
                        return State::abandoned(format!(
                            "initiator's lock does not match the terms: {:#}",
                            e
                        ))
                    }
                }
            },
            State::InitiatorLocked { alpha } => {
                let remaining = match self
                    .retry(|| self.alpha.time_until_refundable(&alpha))
                    .await
                {
                    Ok(remaining) => remaining,
                    Err(e) => {
                        return State::abandoned(format!(
                            "failed to check initiator's lock: {:#}",
                            e
                        ))
                    }
                };
                let required = self.beta.lock_duration() + self.policy.safety_margin;
                if remaining < required {
                    return State::abandoned(format!(
                        "initiator's lock is refundable in {:?}, at least {:?} required",
                        remaining, required
                    ));
                }

                match self.retry(|| self.beta.lock()).await {
                    Ok(beta) => State::ResponderLocked { alpha, beta },
                    Err(e) => State::abandoned(format!(
                        "failed to lock on {}: {:#}",
                        self.beta.chain(),
                        e
                    )),
                }
            }
            State::ResponderLocked { alpha, beta } => loop {
                match self.retry(|| self.beta.revealed_secret(&beta)).await {
                    Ok(Some(secret)) => {
                        return State::SecretRevealed {
                            alpha,
                            beta,
                            secret,
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(
                            "failed to learn the secret from {}: {:#}",
                            self.beta.chain(),
                            e
                        );
                        return State::TimedOutRefunding {
                            alpha,
                            beta: Some(beta),
                        };
                    }
                }
                if self.is_refundable(&self.beta, &beta).await {
                    tracing::warn!("initiator did not claim before the timeout");
                    return State::TimedOutRefunding {
                        alpha,
                        beta: Some(beta),
                    };
                }

                tokio::time::sleep(self.policy.poll_interval).await;
            },
            State::SecretRevealed {
                alpha,
                beta,
                secret,
            } => loop {
                let error = match self.retry(|| self.alpha.claim(&alpha, secret)).await {
                    Ok(()) => {
                        return State::BothSettled {
                            alpha,
                            beta,
                            secret,
                        }
                    }
                    Err(e) => e,
                };

                if error.disposition() == Disposition::Wait {
                    tracing::debug!(
                        "claim on {} not possible yet: {:#}",
                        self.alpha.chain(),
                        error
                    );
                } else {
                    match self.retry(|| self.alpha.is_consumed(&alpha)).await {
                        Ok(true) => {
                            return State::abandoned(format!(
                                "initiator's lock was consumed before we could claim it: {:#}",
                                error
                            ))
                        }
                        Ok(false) => {}
                        Err(e) => tracing::warn!("failed to check initiator's lock: {:#}", e),
                    }
                    tracing::warn!(
                        "failed to claim on {} with the revealed secret: {:#}",
                        self.alpha.chain(),
                        error
                    );
                }

                tokio::time::sleep(self.policy.poll_interval).await;
            },
            State::TimedOutRefunding {
                alpha,
                beta: Some(beta),
            } => {
                let error = match self.refund(&self.beta, &beta).await {
                    Ok(()) => {
                        return State::Refunded {
                            alpha,
                            beta: Some(beta),
                        }
                    }
                    Err(e) => e,
                };

                match self.retry(|| self.beta.revealed_secret(&beta)).await {
                    Ok(Some(secret)) => {
                        tracing::warn!("own lock was claimed, claiming the initiator's lock");
                        State::SecretRevealed {
                            alpha,
                            beta,
                            secret,
                        }
                    }
                    _ => State::abandoned(format!("failed to refund: {:#}", error)),
                }
            }
            State::TimedOutRefunding { beta: None, .. } => {
                State::abandoned("nothing to refund, no lock of ours is known")
            }
            terminal => terminal,
        }
    }

    async fn is_refundable<L: Leg>(&self, leg: &L, lock: &L::Lock) -> bool {
        match self.retry(|| leg.time_until_refundable(lock)).await {
            Ok(remaining) => remaining == Duration::from_secs(0),
            Err(e) => {
                tracing::warn!("failed to check timeout on {}: {:#}", leg.chain(), e);
                false
            }
        }
    }

    /// Refunds `lock` as soon as its timeout matured.
    async fn refund<L: Leg>(&self, leg: &L, lock: &L::Lock) -> Result<(), Error> {
        loop {
            let remaining = self.retry(|| leg.time_until_refundable(lock)).await?;
            if remaining > Duration::from_secs(0) {
                tracing::debug!("refundable on {} in {:?}", leg.chain(), remaining);
                tokio::time::sleep(remaining.min(self.policy.poll_interval)).await;
                continue;
            }

            match self.retry(|| leg.refund(lock)).await {
                Err(e) if e.disposition() == Disposition::Wait => {
                    tracing::debug!("refund on {} is premature: {:#}", leg.chain(), e);
                    tokio::time::sleep(self.policy.poll_interval).await;
                }
                result => return result,
            }
        }
    }

    /// Repeats `operation` while it fails transiently.
    async fn retry<T, F, Fut>(&self, operation: F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        backoff::future::retry_notify(
            Constant::new(self.policy.poll_interval),
            || {
                let future = operation();
                async move {
                    future.await.map_err(|e| match e.disposition() {
                        Disposition::Retry => backoff::Error::transient(e),
                        Disposition::Wait | Disposition::Abandon => backoff::Error::permanent(e),
                    })
                }
            },
            |e: Error, _| tracing::warn!("{:#}, retrying ...", e),
        )
        .await
    }
}
