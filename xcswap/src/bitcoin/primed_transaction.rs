use crate::{
    bitcoin::{htlc::UnlockItem, UnlockParameters, SECP},
    error::InputError,
};
use bitcoin::{
    absolute::LockTime,
    hashes::Hash,
    secp256k1::Message,
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Address, Amount, OutPoint, ScriptBuf, Transaction, TxIn, TxOut, Witness,
};

#[derive(Clone, Debug, PartialEq)]
pub struct PrimedInput {
    unlock_parameters: UnlockParameters,
    value: Amount,
    previous_output: OutPoint,
}

impl PrimedInput {
    pub fn new(
        previous_output: OutPoint,
        value: Amount,
        unlock_parameters: UnlockParameters,
    ) -> PrimedInput {
        PrimedInput {
            unlock_parameters,
            value,
            previous_output,
        }
    }

    fn to_unsigned_txin(&self) -> TxIn {
        TxIn {
            previous_output: self.previous_output,
            script_sig: ScriptBuf::new(),
            sequence: self.unlock_parameters.sequence,
            witness: Witness::new(),
        }
    }
}

/// A transaction spending script-hash outputs to a single address, ready for
/// signing.
#[derive(Debug, Clone)]
pub struct PrimedTransaction {
    pub inputs: Vec<PrimedInput>,
    pub output_address: Address,
}

impl PrimedTransaction {
    /// Signs every input with SIGHASH_ALL over its redeem script and pays
    /// the input total minus `fee` to the output address.
    pub fn sign_with_fee(self, fee: Amount) -> Result<Transaction, InputError> {
        let total = self.total_input_value();
        let value = total
            .checked_sub(fee)
            .filter(|value| *value > Amount::ZERO)
            .ok_or(InputError::InsufficientFunds { amount: total, fee })?;

        let mut transaction = self.unsigned_transaction(value);
        let script_sigs = self.script_sigs(&transaction)?;

        for (input, script_sig) in transaction.input.iter_mut().zip(script_sigs) {
            input.script_sig = script_sig;
        }

        Ok(transaction)
    }

    pub fn total_input_value(&self) -> Amount {
        self.inputs
            .iter()
            .fold(Amount::ZERO, |acc, input| acc + input.value)
    }

    fn unsigned_transaction(&self, value: Amount) -> Transaction {
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: self
                .inputs
                .iter()
                .map(PrimedInput::to_unsigned_txin)
                .collect(),
            output: vec![TxOut {
                value,
                script_pubkey: self.output_address.script_pubkey(),
            }],
        }
    }

    // Legacy sighashes blank every other scriptSig, so signing against the
    // unsigned transaction is the same as signing the final one.
    fn script_sigs(&self, transaction: &Transaction) -> Result<Vec<ScriptBuf>, InputError> {
        let cache = SighashCache::new(transaction);

        self.inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let parameters = &input.unlock_parameters;
                let sighash = cache
                    .legacy_signature_hash(
                        index,
                        &parameters.redeem_script,
                        EcdsaSighashType::All.to_u32(),
                    )
                    .map_err(|e| InputError::Signing(e.to_string()))?;
                let message = Message::from_digest(sighash.to_byte_array());

                let signatures = parameters
                    .items
                    .iter()
                    .filter_map(|item| match item {
                        UnlockItem::Signature(key_pair) => Some(key_pair.secret_key()),
                        _ => None,
                    })
                    .map(|secret_key| {
                        let mut signature = SECP
                            .sign_ecdsa(&message, &secret_key)
                            .serialize_der()
                            .to_vec();
                        signature.push(EcdsaSighashType::All as u8);
                        signature
                    })
                    .collect::<Vec<_>>();

                parameters.script_sig(&signatures)
            })
            .collect()
    }
}
