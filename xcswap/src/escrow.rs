//! XRPL escrow with a PREIMAGE-SHA-256 condition.
//!
//! The owner locks XRP for a destination. The escrow is finished by anyone
//! presenting the fulfillment of its condition, or cancelled by anyone once
//! `CancelAfter` has passed in ledger time. Exactly one of the two succeeds.

use crate::{
    error::{Chain, Error, ExtractionError, InputError, RejectionKind, Violation},
    xrpl::{AccountId, Drops, EscrowEntry, Submission, Wallet, XrplLedger},
    Condition, Fulfillment, RippleTime, Secret,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    pub owner: AccountId,
    pub destination: AccountId,
    pub amount: Drops,
    pub condition: Condition,
    pub cancel_after: RippleTime,
}

/// An escrow accepted by the ledger, addressed by its owner and the sequence
/// of the creating transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub owner: AccountId,
    pub offer_sequence: u32,
    pub tx_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Create(Params),
    Finish {
        owner: AccountId,
        offer_sequence: u32,
        condition: Condition,
        fulfillment: Fulfillment,
    },
    Cancel {
        owner: AccountId,
        offer_sequence: u32,
    },
}

impl Operation {
    pub fn transaction_type(&self) -> &'static str {
        match self {
            Operation::Create(_) => "EscrowCreate",
            Operation::Finish { .. } => "EscrowFinish",
            Operation::Cancel { .. } => "EscrowCancel",
        }
    }

    /// The unsigned transaction submitted on behalf of `account`.
    pub fn to_tx_json(&self, account: &AccountId) -> serde_json::Value {
        match self {
            Operation::Create(params) => json!({
                "TransactionType": self.transaction_type(),
                "Account": account.to_string(),
                "Destination": params.destination.to_string(),
                "Amount": params.amount.to_string(),
                "Condition": params.condition.to_string(),
                "CancelAfter": params.cancel_after.seconds(),
            }),
            Operation::Finish {
                owner,
                offer_sequence,
                condition,
                fulfillment,
            } => json!({
                "TransactionType": self.transaction_type(),
                "Account": account.to_string(),
                "Owner": owner.to_string(),
                "OfferSequence": offer_sequence,
                "Condition": condition.to_string(),
                "Fulfillment": fulfillment.to_string(),
            }),
            Operation::Cancel {
                owner,
                offer_sequence,
            } => json!({
                "TransactionType": self.transaction_type(),
                "Account": account.to_string(),
                "Owner": owner.to_string(),
                "OfferSequence": offer_sequence,
            }),
        }
    }
}

/// Maps an engine result code onto the rejection taxonomy. `Ok` only for
/// `tesSUCCESS`.
pub fn classify_engine_result(code: &str) -> Result<(), RejectionKind> {
    match code {
        "tesSUCCESS" => Ok(()),
        "tecNO_PERMISSION" => Err(RejectionKind::PrematureTimelock),
        "tecNO_TARGET" | "tecNO_ENTRY" => Err(RejectionKind::AlreadySettled),
        "tecCRYPTOCONDITION_ERROR" => Err(RejectionKind::ConditionMismatch),
        "tecINSUFFICIENT_RESERVE" => Err(RejectionKind::InsufficientFunds),
        code if code.starts_with("tecUNFUNDED") => Err(RejectionKind::InsufficientFunds),
        code if code.starts_with("tem") => Err(RejectionKind::Malformed),
        code if code.starts_with("ter") || code.starts_with("tel") => {
            Err(RejectionKind::Transient)
        }
        _ => Err(RejectionKind::Other),
    }
}

async fn submit<L>(ledger: &L, wallet: &Wallet, operation: &Operation) -> Result<Submission, Error>
where
    L: XrplLedger + ?Sized,
{
    let tx_json = operation.to_tx_json(&wallet.address);
    tracing::debug!("submitting {}", tx_json);

    let submission = ledger
        .submit(tx_json, &wallet.secret)
        .await
        .map_err(|e| Error::connection(Chain::Xrpl, e))?;

    classify_engine_result(&submission.engine_result).map_err(|kind| {
        Error::rejected(Chain::Xrpl, kind, submission.engine_result.as_str())
    })?;

    tracing::info!(
        "{} accepted in {}",
        operation.transaction_type(),
        submission.tx_hash
    );

    Ok(submission)
}

pub async fn create_escrow<L>(ledger: &L, wallet: &Wallet, params: Params) -> Result<Created, Error>
where
    L: XrplLedger + ?Sized,
{
    if wallet.address != params.owner {
        return Err(InputError::KeyMismatch(format!("escrow owner {}", params.owner)).into());
    }

    let owner = params.owner.clone();
    let submission = submit(ledger, wallet, &Operation::Create(params)).await?;
    let offer_sequence = submission.sequence.ok_or_else(|| {
        Error::connection(
            Chain::Xrpl,
            anyhow::anyhow!("node did not report the sequence of {}", submission.tx_hash),
        )
    })?;

    Ok(Created {
        owner,
        offer_sequence,
        tx_hash: submission.tx_hash,
    })
}

/// Finishes the escrow, publishing `fulfillment`. Any account may act.
pub async fn finish_escrow<L>(
    ledger: &L,
    actor: &Wallet,
    created: &Created,
    condition: Condition,
    fulfillment: Fulfillment,
) -> Result<String, Error>
where
    L: XrplLedger + ?Sized,
{
    if !condition.is_fulfilled_by(&fulfillment) {
        return Err(Error::violation(Chain::Xrpl, Violation::FulfillmentMismatch));
    }

    let operation = Operation::Finish {
        owner: created.owner.clone(),
        offer_sequence: created.offer_sequence,
        condition,
        fulfillment,
    };

    submit(ledger, actor, &operation)
        .await
        .map(|submission| submission.tx_hash)
}

/// Returns the escrowed XRP to its owner. Any account may act, the ledger
/// answers `tecNO_PERMISSION` before `CancelAfter`.
pub async fn cancel_escrow<L>(
    ledger: &L,
    actor: &Wallet,
    created: &Created,
) -> Result<String, Error>
where
    L: XrplLedger + ?Sized,
{
    let operation = Operation::Cancel {
        owner: created.owner.clone(),
        offer_sequence: created.offer_sequence,
    };

    submit(ledger, actor, &operation)
        .await
        .map(|submission| submission.tx_hash)
}

/// Looks up an open escrow of `params.owner` carrying `params.condition`.
pub async fn find_escrow<L>(
    ledger: &L,
    params: &Params,
) -> Result<Option<(Created, EscrowEntry)>, Error>
where
    L: XrplLedger + ?Sized,
{
    let connection = |e| Error::connection(Chain::Xrpl, e);

    let entry = ledger
        .escrows_of(&params.owner)
        .await
        .map_err(connection)?
        .into_iter()
        .find(|entry| entry.condition == Some(params.condition));

    let entry = match entry {
        Some(entry) => entry,
        None => return Ok(None),
    };
    let tx_hash = match &entry.created_by {
        Some(tx_hash) => tx_hash.clone(),
        None => return Ok(None),
    };

    let offer_sequence = ledger
        .validated_transaction(&tx_hash)
        .await
        .map_err(connection)?
        .and_then(|transaction| transaction.sequence);

    Ok(offer_sequence.map(|offer_sequence| {
        (
            Created {
                owner: params.owner.clone(),
                offer_sequence,
                tx_hash,
            },
            entry,
        )
    }))
}

/// Checks an escrow entry against what was agreed.
pub fn verify_entry(params: &Params, entry: &EscrowEntry) -> Result<(), Violation> {
    if entry.amount != params.amount {
        return Err(Violation::AmountMismatch {
            expected: params.amount.to_xrp_string(),
            actual: entry.amount.to_xrp_string(),
        });
    }
    if entry.destination != params.destination {
        return Err(Violation::DestinationMismatch {
            expected: params.destination.to_string(),
            actual: entry.destination.to_string(),
        });
    }
    if entry.condition != Some(params.condition) {
        return Err(Violation::ConditionMismatch);
    }
    // The counterparty must be able to finish as soon as the secret is out.
    if let Some(finish_after) = entry.finish_after {
        return Err(Violation::DelayedFinish {
            finish_after: finish_after.seconds(),
        });
    }
    match entry.cancel_after {
        Some(cancel_after) if cancel_after >= params.cancel_after => Ok(()),
        Some(cancel_after) => Err(Violation::InsufficientTimeout {
            remaining_secs: u64::from(cancel_after.seconds()),
            required_secs: u64::from(params.cancel_after.seconds()),
        }),
        None => Err(Violation::InsufficientTimeout {
            remaining_secs: 0,
            required_secs: u64::from(params.cancel_after.seconds()),
        }),
    }
}

/// The secret published by the EscrowFinish that settled `created`.
///
/// `Ok(None)` while no finish was validated.
pub async fn revealed_secret<L>(
    ledger: &L,
    created: &Created,
    condition: Condition,
) -> Result<Option<Secret>, Error>
where
    L: XrplLedger + ?Sized,
{
    let encoded = ledger
        .escrow_finish_fulfillment(&created.owner, created.offer_sequence)
        .await
        .map_err(|e| Error::connection(Chain::Xrpl, e))?;

    let encoded = match encoded {
        Some(encoded) => encoded,
        None => return Ok(None),
    };

    let malformed = |reason: String| {
        Error::extraction(Chain::Xrpl, ExtractionError::MalformedFulfillment(reason))
    };
    let fulfillment = encoded
        .parse::<Fulfillment>()
        .map_err(|e| malformed(e.to_string()))?;
    if !condition.is_fulfilled_by(&fulfillment) {
        return Err(Error::violation(Chain::Xrpl, Violation::FulfillmentMismatch));
    }

    fulfillment
        .to_secret()
        .map(Some)
        .map_err(|e| malformed(e.to_string()))
}
