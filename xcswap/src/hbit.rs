//! Htlc Bitcoin atomic swap protocol.
//!
//! The asset is locked in a P2SH output whose redeem script is compiled by
//! [`Htlc`]. It is claimed by revealing the secret on the hash branch or
//! refunded after the relative timelock on the timelock branch.

use crate::{
    bitcoin::{Htlc, KeyPair, PrimedInput, PrimedTransaction},
    error::{ExtractionError, InputError},
    ledger,
    timelock::RelativeTimelock,
    Secret, SecretHash,
};
use bitcoin::{
    opcodes::all::{OP_PUSHNUM_1, OP_PUSHNUM_16},
    script::Instruction,
    Address, Amount, OutPoint, PublicKey, Script, Transaction,
};
use serde::{Deserialize, Serialize};

/// Number of elements in a hash branch scriptSig.
const CLAIM_ELEMENTS: usize = 5;
/// Number of elements in a timelock branch scriptSig.
const REFUND_ELEMENTS: usize = 4;
const SECRET_POSITION: usize = 2;
const CLAIM_SELECTOR_POSITION: usize = 3;
const REFUND_SELECTOR_POSITION: usize = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Params {
    pub network: ledger::Bitcoin,
    pub asset: Amount,
    pub claim_identity: PublicKey,
    pub refund_identity: PublicKey,
    pub timelock: RelativeTimelock,
    pub secret_hash: SecretHash,
}

/// The HTLC output after it was confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funded {
    pub location: OutPoint,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub asset: Amount,
    /// Height of the block that confirmed the funding transaction. The
    /// relative timelock counts from here.
    pub height: u32,
}

/// How an HTLC output was consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Spend {
    Claimed(Secret),
    Refunded,
}

impl Params {
    /// Compiles the HTLC, refusing a single key on both branches.
    pub fn htlc(&self) -> Result<Htlc, InputError> {
        if self.claim_identity == self.refund_identity {
            return Err(InputError::IdenticalIdentities);
        }

        Ok(Htlc::new(
            self.secret_hash,
            self.claim_identity.pubkey_hash(),
            self.refund_identity.pubkey_hash(),
            self.timelock,
        ))
    }

    pub fn compute_address(&self) -> Result<Address, InputError> {
        self.htlc()?.compute_address(self.network.into())
    }

    /// Builds the transaction that spends `funded` through the hash branch,
    /// publishing `secret`.
    pub fn build_claim_transaction(
        &self,
        funded: &Funded,
        key_pair: KeyPair,
        secret: Secret,
        destination: Address,
        fee: Amount,
    ) -> Result<Transaction, InputError> {
        if key_pair.public_key() != self.claim_identity {
            return Err(InputError::KeyMismatch("the claim identity".to_owned()));
        }
        let htlc = self.htlc()?;
        let unlock = htlc.unlock_with_secret(key_pair, secret);

        spend(funded, unlock, destination, fee)
    }

    /// Builds the transaction that spends `funded` through the timelock
    /// branch. A node rejects it until the timelock matured.
    pub fn build_refund_transaction(
        &self,
        funded: &Funded,
        key_pair: KeyPair,
        destination: Address,
        fee: Amount,
    ) -> Result<Transaction, InputError> {
        if key_pair.public_key() != self.refund_identity {
            return Err(InputError::KeyMismatch("the refund identity".to_owned()));
        }
        let htlc = self.htlc()?;
        let unlock = htlc.unlock_after_timeout(key_pair, self.timelock);

        spend(funded, unlock, destination, fee)
    }
}

fn spend(
    funded: &Funded,
    unlock: crate::bitcoin::UnlockParameters,
    destination: Address,
    fee: Amount,
) -> Result<Transaction, InputError> {
    let transaction = PrimedTransaction {
        inputs: vec![PrimedInput::new(funded.location, funded.asset, unlock)],
        output_address: destination,
    }
    .sign_with_fee(fee)?;

    tracing::debug!(
        "signed spend of {}: {}",
        funded.location,
        bitcoin::consensus::encode::serialize_hex(&transaction)
    );

    Ok(transaction)
}

/// Recovers the secret from the first input of a claim transaction.
pub fn extract_secret(transaction: &Transaction) -> Result<Secret, ExtractionError> {
    let input = transaction.input.first().ok_or(ExtractionError::NoInputs)?;

    secret_from_elements(&elements(&input.script_sig)?)
}

/// Decides whether the input of `transaction` spending `outpoint` took the
/// hash or the timelock branch.
pub fn classify_spend(
    transaction: &Transaction,
    outpoint: OutPoint,
) -> Result<Spend, ExtractionError> {
    let input = transaction
        .input
        .iter()
        .find(|input| input.previous_output == outpoint)
        .ok_or(ExtractionError::NoInputs)?;
    let elements = elements(&input.script_sig)?;

    if elements.len() == REFUND_ELEMENTS && elements[REFUND_SELECTOR_POSITION].is_empty() {
        return Ok(Spend::Refunded);
    }

    secret_from_elements(&elements).map(Spend::Claimed)
}

fn secret_from_elements(elements: &[Vec<u8>]) -> Result<Secret, ExtractionError> {
    if elements.len() < CLAIM_ELEMENTS {
        return Err(ExtractionError::TooFewElements {
            expected: CLAIM_ELEMENTS,
            found: elements.len(),
        });
    }
    if elements[CLAIM_SELECTOR_POSITION] != [1] {
        return Err(ExtractionError::WrongBranch);
    }

    let candidate = &elements[SECRET_POSITION];
    Secret::from_vec(candidate).map_err(|_| ExtractionError::NotAPreimage {
        position: SECRET_POSITION,
        length: candidate.len(),
    })
}

/// The pushed elements of a scriptSig. Small integers come out as a single
/// byte, `OP_0` as an empty element.
fn elements(script_sig: &Script) -> Result<Vec<Vec<u8>>, ExtractionError> {
    script_sig
        .instructions()
        .map(|instruction| {
            match instruction.map_err(|e| ExtractionError::Undecodable(e.to_string()))? {
                Instruction::PushBytes(bytes) => Ok(bytes.as_bytes().to_vec()),
                Instruction::Op(op)
                    if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) =>
                {
                    Ok(vec![op.to_u8() - OP_PUSHNUM_1.to_u8() + 1])
                }
                Instruction::Op(op) => Err(ExtractionError::Undecodable(format!(
                    "unexpected {} in unlocking script",
                    op
                ))),
            }
        })
        .collect()
}
