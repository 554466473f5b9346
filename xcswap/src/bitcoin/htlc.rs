//! The hash-and-relative-timelock redeem script and its unlocking data.
//!
//! ```text
//! OP_IF
//!     OP_SHA256 <secret_hash> OP_EQUALVERIFY
//!     OP_DUP OP_HASH160 <claim_pubkey_hash> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ELSE
//!     <relative_timelock> OP_CHECKSEQUENCEVERIFY OP_DROP
//!     OP_DUP OP_HASH160 <refund_pubkey_hash> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ENDIF
//! ```

use crate::{
    bitcoin::KeyPair, error::InputError, timelock::RelativeTimelock, Secret, SecretHash,
};
use bitcoin::{
    hashes::Hash,
    opcodes::all::{
        OP_CHECKSIG, OP_CSV, OP_DROP, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY, OP_HASH160,
        OP_IF, OP_SHA256,
    },
    script::{Builder, PushBytesBuf},
    Address, Network, PubkeyHash, PublicKey, Script, ScriptBuf, Sequence,
};
use std::convert::TryFrom;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Htlc {
    script: ScriptBuf,
}

impl Htlc {
    pub fn new(
        secret_hash: SecretHash,
        claim_identity: PubkeyHash,
        refund_identity: PubkeyHash,
        timelock: RelativeTimelock,
    ) -> Self {
        let script = build_redeem_script(secret_hash, claim_identity, refund_identity, timelock);
        tracing::debug!("redeem script: {}", script.to_hex_string());

        Htlc { script }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn into_script(self) -> ScriptBuf {
        self.script
    }

    pub fn compute_address(&self, network: Network) -> Result<Address, InputError> {
        derive_deposit_address(&self.script, network)
    }

    /// Unlocking data for the hash branch, in stack order.
    pub fn unlock_with_secret(&self, key_pair: KeyPair, secret: Secret) -> UnlockParameters {
        UnlockParameters {
            items: vec![
                UnlockItem::Signature(key_pair),
                UnlockItem::PublicKey(key_pair.public_key()),
                UnlockItem::Data(secret.as_raw_secret().to_vec()),
                UnlockItem::Bool(true),
                UnlockItem::RedeemScript,
            ],
            sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
            redeem_script: self.script.clone(),
        }
    }

    /// Unlocking data for the timelock branch. The input's sequence carries
    /// the same encoding as the script.
    pub fn unlock_after_timeout(
        &self,
        key_pair: KeyPair,
        timelock: RelativeTimelock,
    ) -> UnlockParameters {
        UnlockParameters {
            items: vec![
                UnlockItem::Signature(key_pair),
                UnlockItem::PublicKey(key_pair.public_key()),
                UnlockItem::Bool(false),
                UnlockItem::RedeemScript,
            ],
            sequence: timelock.to_sequence(),
            redeem_script: self.script.clone(),
        }
    }
}

pub fn build_redeem_script(
    secret_hash: SecretHash,
    claim_identity: PubkeyHash,
    refund_identity: PubkeyHash,
    timelock: RelativeTimelock,
) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_IF)
        .push_opcode(OP_SHA256)
        .push_slice(secret_hash.into_raw())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(claim_identity.to_byte_array())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_int(i64::from(timelock.to_consensus_u32()))
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(refund_identity.to_byte_array())
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script()
}

/// The pay-to-script-hash address funding transactions pay to.
pub fn derive_deposit_address(script: &Script, network: Network) -> Result<Address, InputError> {
    Address::p2sh(script, network).map_err(|_| InputError::ScriptTooLarge)
}

/// One element of an unlocking script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnlockItem {
    Data(Vec<u8>),
    /// Replaced by a SIGHASH_ALL signature made with this key.
    Signature(KeyPair),
    PublicKey(PublicKey),
    /// Branch selector, `OP_1` or `OP_0`.
    Bool(bool),
    RedeemScript,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnlockParameters {
    pub items: Vec<UnlockItem>,
    pub sequence: Sequence,
    pub redeem_script: ScriptBuf,
}

impl UnlockParameters {
    /// Assembles the scriptSig given a signature for every
    /// [`UnlockItem::Signature`], in order.
    pub fn script_sig(&self, signatures: &[Vec<u8>]) -> Result<ScriptBuf, InputError> {
        let mut signatures = signatures.iter();
        let mut builder = Builder::new();

        for item in &self.items {
            builder = match item {
                UnlockItem::Data(data) => builder.push_slice(push_bytes(data.clone())?),
                UnlockItem::Signature(_) => {
                    let signature = signatures.next().ok_or_else(|| {
                        InputError::Signing("missing signature for unlocking script".to_owned())
                    })?;
                    builder.push_slice(push_bytes(signature.clone())?)
                }
                UnlockItem::PublicKey(public_key) => builder.push_key(public_key),
                UnlockItem::Bool(true) => builder.push_int(1),
                UnlockItem::Bool(false) => builder.push_int(0),
                UnlockItem::RedeemScript => {
                    builder.push_slice(push_bytes(self.redeem_script.to_bytes())?)
                }
            };
        }

        Ok(builder.into_script())
    }
}

fn push_bytes(bytes: Vec<u8>) -> Result<PushBytesBuf, InputError> {
    PushBytesBuf::try_from(bytes).map_err(|e| InputError::Signing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectral::prelude::*;
    use std::str::FromStr;

    fn alice() -> KeyPair {
        KeyPair::from_wif("cScfkGjbzzoeewVWmU2hYPUHeVGJRDdFt7WhmrVVGkxpmPP8BHWe").unwrap()
    }

    fn bob() -> KeyPair {
        KeyPair::from_wif("cMkopUXKWsEzAjfa1zApksGRwjVpJRB3831qM9W4gKZsLwjHXA9x").unwrap()
    }

    fn secret_hash() -> SecretHash {
        SecretHash::from_str("14e0a17b13d84c9f401fb5feace39e37e860948c6eac366e33bae2b4866f199a")
            .unwrap()
    }

    #[test]
    fn compiles_redeem_script() {
        let htlc = Htlc::new(
            secret_hash(),
            alice().pubkey_hash(),
            bob().pubkey_hash(),
            RelativeTimelock::blocks(5).unwrap(),
        );

        assert_that!(htlc.script().to_hex_string()).is_equal_to(
            "63a82014e0a17b13d84c9f401fb5feace39e37e860948c6eac366e33bae2b4866f199a\
             8876a91475d715f9a84555e752772c9ad62be90b3b7bb88a88ac\
             6755b27576a914fe503bd5e237c4a6bbd0a30c104b4a9302e0013e88ac68"
                .to_owned(),
        );
    }

    #[test]
    fn derives_regtest_deposit_address() {
        let htlc = Htlc::new(
            secret_hash(),
            alice().pubkey_hash(),
            bob().pubkey_hash(),
            RelativeTimelock::blocks(5).unwrap(),
        );

        let address = htlc.compute_address(Network::Regtest).unwrap();

        assert_that!(address.to_string())
            .is_equal_to("2MxBVe8WdP9XfH8yBC3ppY3FYKFuxsPrqBG".to_owned());
    }

    #[test]
    fn larger_timelocks_are_pushed_as_script_numbers() {
        let htlc = Htlc::new(
            secret_hash(),
            alice().pubkey_hash(),
            bob().pubkey_hash(),
            RelativeTimelock::blocks(900).unwrap(),
        );

        assert_that!(htlc.script().to_hex_string()).contains("67028403b275");
    }

    #[test]
    fn claim_and_refund_identities_differ() {
        assert_that!(alice().pubkey_hash()).is_not_equal_to(bob().pubkey_hash());
    }

    #[test]
    fn refund_sequence_matches_script_timelock() {
        let timelock = RelativeTimelock::blocks(5).unwrap();
        let htlc = Htlc::new(
            secret_hash(),
            alice().pubkey_hash(),
            bob().pubkey_hash(),
            timelock,
        );

        let unlock = htlc.unlock_after_timeout(bob(), timelock);

        assert_that!(unlock.sequence.to_consensus_u32()).is_equal_to(5);
        assert_that!(unlock.items.len()).is_equal_to(4);
    }

    #[test]
    fn script_sig_needs_a_signature_per_signature_item() {
        let htlc = Htlc::new(
            secret_hash(),
            alice().pubkey_hash(),
            bob().pubkey_hash(),
            RelativeTimelock::blocks(5).unwrap(),
        );
        let unlock = htlc.unlock_after_timeout(bob(), RelativeTimelock::blocks(5).unwrap());

        assert_that!(unlock.script_sig(&[])).is_err();
    }
}
