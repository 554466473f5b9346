//! In-memory ledgers enforcing the rules the swap relies on, and an
//! in-memory swap store.

use crate::{
    bitcoin::{
        htlc::build_redeem_script, BitcoinLedger, BroadcastError, ObservedTransaction, Utxo,
        SECP,
    },
    swap::{Load, Save},
    timelock::RelativeTimelock,
    xrpl::{AccountId, Drops, EscrowEntry, Submission, ValidatedTransaction, Wallet, XrplLedger},
    Condition, Fulfillment, RippleTime, SecretHash, SwapId, Timestamp,
};
use async_trait::async_trait;
use bitcoin::{
    absolute::LockTime,
    hashes::{hash160, sha256, sha256d, Hash},
    opcodes::all::{OP_PUSHNUM_1, OP_PUSHNUM_16},
    script::Instruction,
    secp256k1::{ecdsa::Signature, Message},
    sighash::SighashCache,
    transaction::Version,
    Address, Amount, OutPoint, PubkeyHash, PublicKey, Script, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    convert::TryFrom,
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

const GENESIS_TIME: u32 = 1_600_000_000;
const BLOCK_SPACING: u32 = 600;

const MISSING_OR_SPENT: &str = "bad-txns-inputs-missingorspent";
const NON_FINAL: &str = "non-BIP68-final";
const SCRIPT_FAILED: &str = "mandatory-script-verify-flag-failed";

#[derive(Debug, Default)]
struct ChainState {
    height: u32,
    utxos: HashMap<OutPoint, (TxOut, u32)>,
    transactions: HashMap<Txid, (Transaction, u32)>,
    coinbase_nonce: u32,
}

impl ChainState {
    /// Confirms `transaction` in a new block.
    fn mine(&mut self, transaction: Transaction) -> Txid {
        self.height += 1;
        let txid = transaction.compute_txid();

        for input in &transaction.input {
            self.utxos.remove(&input.previous_output);
        }
        for (vout, output) in transaction.output.iter().enumerate() {
            self.utxos.insert(
                OutPoint {
                    txid,
                    vout: vout as u32,
                },
                (output.clone(), self.height),
            );
        }
        self.transactions.insert(txid, (transaction, self.height));

        txid
    }
}

/// A Bitcoin chain that mines every accepted transaction into its own block
/// and validates HTLC spends the way a node does.
#[derive(Debug)]
pub struct FakeBitcoin {
    chain: Mutex<ChainState>,
    /// Mine an empty block whenever the height is queried.
    auto_mine: bool,
    failures: AtomicUsize,
}

impl Default for FakeBitcoin {
    fn default() -> Self {
        Self {
            chain: Mutex::new(ChainState {
                height: 101,
                ..ChainState::default()
            }),
            auto_mine: false,
            failures: AtomicUsize::new(0),
        }
    }
}

impl FakeBitcoin {
    pub fn auto_mining() -> Self {
        Self {
            auto_mine: true,
            ..Self::default()
        }
    }

    /// Lets the next `count` requests fail as if the node was unreachable.
    pub fn fail_next_requests(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn mine(&self, blocks: u32) {
        self.chain.lock().unwrap().height += blocks;
    }

    pub fn height(&self) -> u32 {
        self.chain.lock().unwrap().height
    }

    pub fn balance(&self, address: &Address) -> Amount {
        let script_pubkey = address.script_pubkey();

        self.chain
            .lock()
            .unwrap()
            .utxos
            .values()
            .filter(|(output, _)| output.script_pubkey == script_pubkey)
            .fold(Amount::ZERO, |acc, (output, _)| acc + output.value)
    }

    fn unreachable(&self) -> anyhow::Result<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("connection refused");
        }

        Ok(())
    }
}

fn median_time_past(height: u32) -> Timestamp {
    Timestamp::from(GENESIS_TIME + BLOCK_SPACING * height)
}

#[async_trait]
impl BitcoinLedger for FakeBitcoin {
    async fn submit_raw_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Txid, BroadcastError> {
        self.unreachable()?;
        let mut chain = self.chain.lock().unwrap();

        if chain.transactions.contains_key(&transaction.compute_txid()) {
            return Err(BroadcastError::Rejected(
                "transaction already in block chain".to_owned(),
            ));
        }

        let mut input_value = Amount::ZERO;
        for (index, input) in transaction.input.iter().enumerate() {
            let (output, confirmed_at) = chain
                .utxos
                .get(&input.previous_output)
                .ok_or_else(|| BroadcastError::Rejected(MISSING_OR_SPENT.to_owned()))?;

            verify_spend(transaction, index, output, *confirmed_at, chain.height)
                .map_err(BroadcastError::Rejected)?;
            input_value += output.value;
        }

        let output_value = transaction
            .output
            .iter()
            .fold(Amount::ZERO, |acc, output| acc + output.value);
        if output_value > input_value {
            return Err(BroadcastError::Rejected("bad-txns-in-belowout".to_owned()));
        }

        Ok(chain.mine(transaction.clone()))
    }

    async fn fetch_raw_transaction(
        &self,
        txid: Txid,
    ) -> anyhow::Result<Option<ObservedTransaction>> {
        self.unreachable()?;
        let chain = self.chain.lock().unwrap();

        Ok(chain
            .transactions
            .get(&txid)
            .map(|(transaction, height)| ObservedTransaction {
                transaction: transaction.clone(),
                height: Some(*height),
            }))
    }

    async fn fetch_unspent_output(&self, address: &Address) -> anyhow::Result<Option<Utxo>> {
        self.unreachable()?;
        let script_pubkey = address.script_pubkey();
        let chain = self.chain.lock().unwrap();

        Ok(chain
            .utxos
            .iter()
            .find(|(_, (output, _))| output.script_pubkey == script_pubkey)
            .map(|(outpoint, (output, height))| Utxo {
                outpoint: *outpoint,
                amount: output.value,
                height: Some(*height),
            }))
    }

    async fn is_unspent(&self, outpoint: OutPoint) -> anyhow::Result<bool> {
        self.unreachable()?;

        Ok(self.chain.lock().unwrap().utxos.contains_key(&outpoint))
    }

    async fn find_spending_transaction(
        &self,
        outpoint: OutPoint,
        from_height: u32,
    ) -> anyhow::Result<Option<ObservedTransaction>> {
        self.unreachable()?;
        let chain = self.chain.lock().unwrap();

        Ok(chain
            .transactions
            .values()
            .filter(|(_, height)| *height >= from_height)
            .find(|(transaction, _)| {
                transaction
                    .input
                    .iter()
                    .any(|input| input.previous_output == outpoint)
            })
            .map(|(transaction, height)| ObservedTransaction {
                transaction: transaction.clone(),
                height: Some(*height),
            }))
    }

    async fn block_height(&self) -> anyhow::Result<u32> {
        self.unreachable()?;
        let mut chain = self.chain.lock().unwrap();
        if self.auto_mine {
            chain.height += 1;
        }

        Ok(chain.height)
    }

    async fn median_time_past(&self, height: u32) -> anyhow::Result<Timestamp> {
        self.unreachable()?;

        Ok(median_time_past(height))
    }

    async fn send_to_address(&self, address: &Address, amount: Amount) -> anyhow::Result<Txid> {
        self.unreachable()?;
        let mut chain = self.chain.lock().unwrap();
        chain.coinbase_nonce += 1;

        let funding = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array(
                        sha256d::Hash::hash(&chain.coinbase_nonce.to_le_bytes()).to_byte_array(),
                    ),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: amount,
                script_pubkey: address.script_pubkey(),
            }],
        };

        Ok(chain.mine(funding))
    }
}

/// Checks input `index` of `transaction` against the P2SH HTLC output it
/// spends, the way script evaluation and BIP68 would.
fn verify_spend(
    transaction: &Transaction,
    index: usize,
    output: &TxOut,
    confirmed_at: u32,
    tip: u32,
) -> Result<(), String> {
    let input = &transaction.input[index];
    let fail = |reason: &str| format!("{} ({})", SCRIPT_FAILED, reason);

    let elements = pushes(&input.script_sig).ok_or_else(|| fail("non-push scriptSig"))?;
    let redeem_script = ScriptBuf::from(elements.last().cloned().unwrap_or_default());
    if ScriptBuf::new_p2sh(&redeem_script.script_hash()) != output.script_pubkey {
        return Err(fail("redeem script does not match script hash"));
    }
    let htlc = parse_htlc(&redeem_script).ok_or_else(|| fail("unknown redeem script"))?;

    let (signature, public_key) = match elements.as_slice() {
        [signature, public_key, secret, selector, _] if *selector == [1u8] => {
            if sha256::Hash::hash(secret).to_byte_array() != htlc.secret_hash {
                return Err(fail("Script failed an OP_EQUALVERIFY operation"));
            }
            if hash160::Hash::hash(public_key).to_byte_array() != htlc.claim_identity {
                return Err(fail("Script failed an OP_EQUALVERIFY operation"));
            }
            (signature, public_key)
        }
        [signature, public_key, selector, _] if selector.is_empty() => {
            if hash160::Hash::hash(public_key).to_byte_array() != htlc.refund_identity {
                return Err(fail("Script failed an OP_EQUALVERIFY operation"));
            }
            verify_sequence(transaction, input.sequence, htlc.timelock)
                .map_err(|reason| fail(&reason))?;
            if !is_mature(htlc.timelock, confirmed_at, tip) {
                return Err(NON_FINAL.to_owned());
            }
            (signature, public_key)
        }
        _ => return Err(fail("Invalid OP_IF construction")),
    };

    verify_signature(transaction, index, &redeem_script, signature, public_key)
        .map_err(|reason| fail(&reason))
}

fn verify_sequence(
    transaction: &Transaction,
    sequence: Sequence,
    required: RelativeTimelock,
) -> Result<(), String> {
    if transaction.version < Version::TWO {
        return Err("Locktime requirement not satisfied".to_owned());
    }

    let satisfied = match (RelativeTimelock::from_consensus_u32(sequence.0), required) {
        (Some(RelativeTimelock::Blocks(actual)), RelativeTimelock::Blocks(required)) => {
            actual >= required
        }
        (Some(RelativeTimelock::Seconds(actual)), RelativeTimelock::Seconds(required)) => {
            actual >= required
        }
        _ => false,
    };

    if satisfied {
        Ok(())
    } else {
        Err("Locktime requirement not satisfied".to_owned())
    }
}

fn is_mature(timelock: RelativeTimelock, confirmed_at: u32, tip: u32) -> bool {
    match timelock {
        RelativeTimelock::Blocks(blocks) => tip + 1 - confirmed_at >= u32::from(blocks),
        RelativeTimelock::Seconds(seconds) => {
            median_time_past(confirmed_at - 1).seconds_until(median_time_past(tip)) >= seconds
        }
    }
}

fn verify_signature(
    transaction: &Transaction,
    index: usize,
    redeem_script: &Script,
    signature: &[u8],
    public_key: &[u8],
) -> Result<(), String> {
    let (sighash_type, der) = signature
        .split_last()
        .ok_or_else(|| "empty signature".to_owned())?;
    let signature = Signature::from_der(der).map_err(|e| e.to_string())?;
    let public_key = PublicKey::from_slice(public_key).map_err(|e| e.to_string())?;

    let sighash = SighashCache::new(transaction)
        .legacy_signature_hash(index, redeem_script, u32::from(*sighash_type))
        .map_err(|e| e.to_string())?;
    let message = Message::from_digest(sighash.to_byte_array());

    SECP.verify_ecdsa(&message, &signature, &public_key.inner)
        .map_err(|_| "Signature must be zero for failed CHECK(MULTI)SIG operation".to_owned())
}

struct ParsedHtlc {
    secret_hash: [u8; 32],
    claim_identity: [u8; 20],
    refund_identity: [u8; 20],
    timelock: RelativeTimelock,
}

/// Recognises exactly the scripts compiled by the HTLC builder.
fn parse_htlc(script: &Script) -> Option<ParsedHtlc> {
    let instructions = script.instructions().collect::<Result<Vec<_>, _>>().ok()?;
    let bytes = |position: usize| match instructions.get(position)? {
        Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
        Instruction::Op(_) => None,
    };

    let secret_hash = <[u8; 32]>::try_from(bytes(2)?).ok()?;
    let claim_identity = <[u8; 20]>::try_from(bytes(6)?).ok()?;
    let refund_identity = <[u8; 20]>::try_from(bytes(15)?).ok()?;
    let timelock = match instructions.get(10)? {
        Instruction::Op(op)
            if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) =>
        {
            u32::from(op.to_u8() - OP_PUSHNUM_1.to_u8() + 1)
        }
        Instruction::PushBytes(bytes) => decode_script_number(bytes.as_bytes())?,
        Instruction::Op(_) => return None,
    };
    let timelock = RelativeTimelock::from_consensus_u32(timelock)?;

    let expected = build_redeem_script(
        SecretHash::from_raw(secret_hash),
        PubkeyHash::from_byte_array(claim_identity),
        PubkeyHash::from_byte_array(refund_identity),
        timelock,
    );
    if expected.as_script() != script {
        return None;
    }

    Some(ParsedHtlc {
        secret_hash,
        claim_identity,
        refund_identity,
        timelock,
    })
}

fn decode_script_number(bytes: &[u8]) -> Option<u32> {
    if bytes.len() > 4 || bytes.last().map_or(false, |last| last & 0x80 != 0) {
        return None;
    }

    Some(
        bytes
            .iter()
            .rev()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)),
    )
}

fn pushes(script_sig: &Script) -> Option<Vec<Vec<u8>>> {
    script_sig
        .instructions()
        .map(|instruction| match instruction.ok()? {
            Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
            Instruction::Op(op)
                if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) =>
            {
                Some(vec![op.to_u8() - OP_PUSHNUM_1.to_u8() + 1])
            }
            Instruction::Op(_) => None,
        })
        .collect()
}

#[derive(Debug)]
struct Account {
    secret: String,
    balance: Drops,
    sequence: u32,
}

#[derive(Debug)]
struct Ledger {
    close_time: RippleTime,
    accounts: HashMap<AccountId, Account>,
    escrows: HashMap<(AccountId, u32), EscrowEntry>,
    transactions: HashMap<String, ValidatedTransaction>,
    fulfillments: HashMap<(AccountId, u32), String>,
    submissions: usize,
    next_account: u32,
    /// EscrowFinish submissions still to be refused as premature.
    denied_finishes: usize,
}

/// An XRPL ledger with escrow semantics and zero fees. Every submission is
/// validated immediately.
#[derive(Debug)]
pub struct FakeXrpl {
    ledger: Mutex<Ledger>,
    /// Seconds the close time advances per query.
    tick: u32,
}

impl Default for FakeXrpl {
    fn default() -> Self {
        Self {
            ledger: Mutex::new(Ledger {
                close_time: RippleTime::now(),
                accounts: HashMap::new(),
                escrows: HashMap::new(),
                transactions: HashMap::new(),
                fulfillments: HashMap::new(),
                submissions: 0,
                next_account: 0,
                denied_finishes: 0,
            }),
            tick: 0,
        }
    }
}

impl FakeXrpl {
    pub fn ticking(seconds_per_query: u32) -> Self {
        Self {
            tick: seconds_per_query,
            ..Self::default()
        }
    }

    pub fn new_wallet(&self, balance: Drops) -> Wallet {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.next_account += 1;

        let mut payload = vec![0u8; 21];
        payload[17..].copy_from_slice(&ledger.next_account.to_be_bytes());
        payload[1] = 0x5A;
        let checksum = sha256d::Hash::hash(&payload).to_byte_array();
        payload.extend_from_slice(&checksum[..4]);

        let address = bs58::encode(payload)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .into_string();
        let address = AccountId::from_str(&address).unwrap();
        let secret = format!("snFakeSeed{}", ledger.next_account);

        ledger.accounts.insert(
            address.clone(),
            Account {
                secret: secret.clone(),
                balance,
                sequence: 1,
            },
        );

        Wallet {
            address,
            secret,
            public_key: None,
        }
    }

    pub fn close_time(&self) -> RippleTime {
        self.ledger.lock().unwrap().close_time
    }

    pub fn advance(&self, seconds: u32) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.close_time = ledger.close_time.plus(seconds);
    }

    pub fn balance(&self, account: &AccountId) -> Drops {
        self.ledger.lock().unwrap().accounts[account].balance
    }

    pub fn submissions(&self) -> usize {
        self.ledger.lock().unwrap().submissions
    }

    /// Refuses the next `count` EscrowFinish transactions with
    /// `tecNO_PERMISSION`, as rippled does for a close time it considers too
    /// early.
    pub fn deny_next_finishes(&self, count: usize) {
        self.ledger.lock().unwrap().denied_finishes = count;
    }
}

impl Ledger {
    fn apply(&mut self, account: &AccountId, sequence: u32, tx_hash: &str, tx: &Value) -> String {
        let result = match tx["TransactionType"].as_str() {
            Some("EscrowCreate") => self.create(account, sequence, tx_hash, tx),
            Some("EscrowFinish") => self.finish(tx),
            Some("EscrowCancel") => self.cancel(tx),
            _ => Err("temUNKNOWN"),
        };

        match result {
            Ok(()) => "tesSUCCESS".to_owned(),
            Err(code) => code.to_owned(),
        }
    }

    fn create(
        &mut self,
        account: &AccountId,
        sequence: u32,
        tx_hash: &str,
        tx: &Value,
    ) -> Result<(), &'static str> {
        let destination = tx["Destination"]
            .as_str()
            .and_then(|address| AccountId::from_str(address).ok())
            .ok_or("temDST_NEEDED")?;
        let amount = tx["Amount"]
            .as_str()
            .and_then(|drops| Drops::from_str(drops).ok())
            .ok_or("temBAD_AMOUNT")?;
        let condition = tx["Condition"]
            .as_str()
            .and_then(|condition| Condition::from_str(condition).ok())
            .ok_or("temMALFORMED")?;
        let cancel_after = tx["CancelAfter"]
            .as_u64()
            .and_then(|seconds| u32::try_from(seconds).ok())
            .map(RippleTime::from_seconds)
            .ok_or("temBAD_EXPIRATION")?;
        let finish_after = match tx.get("FinishAfter") {
            None => None,
            Some(seconds) => seconds
                .as_u64()
                .and_then(|seconds| u32::try_from(seconds).ok())
                .map(RippleTime::from_seconds)
                .map(Some)
                .ok_or("temBAD_EXPIRATION")?,
        };

        if finish_after.map_or(false, |finish_after| finish_after >= cancel_after) {
            return Err("temBAD_EXPIRATION");
        }
        if !self.accounts.contains_key(&destination) {
            return Err("tecNO_DST");
        }
        if cancel_after <= self.close_time {
            return Err("tecNO_PERMISSION");
        }
        let owner = self.accounts.get_mut(account).ok_or("terNO_ACCOUNT")?;
        if owner.balance < amount {
            return Err("tecUNFUNDED");
        }
        owner.balance = Drops::from_drops(owner.balance.as_drops() - amount.as_drops());

        self.escrows.insert(
            (account.clone(), sequence),
            EscrowEntry {
                owner: account.clone(),
                destination,
                amount,
                condition: Some(condition),
                cancel_after: Some(cancel_after),
                finish_after,
                created_by: Some(tx_hash.to_owned()),
            },
        );

        Ok(())
    }

    fn finish(&mut self, tx: &Value) -> Result<(), &'static str> {
        let key = escrow_key(tx)?;
        let entry = self.escrows.get(&key).ok_or("tecNO_TARGET")?;

        if entry
            .cancel_after
            .map_or(false, |cancel_after| self.close_time > cancel_after)
        {
            return Err("tecNO_PERMISSION");
        }
        if entry
            .finish_after
            .map_or(false, |finish_after| self.close_time <= finish_after)
        {
            return Err("tecNO_PERMISSION");
        }
        if self.denied_finishes > 0 {
            self.denied_finishes -= 1;
            return Err("tecNO_PERMISSION");
        }

        let condition = tx["Condition"]
            .as_str()
            .and_then(|condition| Condition::from_str(condition).ok());
        let fulfillment = tx["Fulfillment"]
            .as_str()
            .and_then(|fulfillment| Fulfillment::from_str(fulfillment).ok());
        let fulfilled = match (condition, &fulfillment) {
            (Some(condition), Some(fulfillment)) => {
                entry.condition == Some(condition) && condition.is_fulfilled_by(fulfillment)
            }
            _ => false,
        };
        if !fulfilled {
            return Err("tecCRYPTOCONDITION_ERROR");
        }

        let entry = self.escrows.remove(&key).ok_or("tecNO_TARGET")?;
        self.credit(&entry.destination, entry.amount);
        if let Some(fulfillment) = fulfillment {
            self.fulfillments.insert(key, fulfillment.to_string());
        }

        Ok(())
    }

    fn cancel(&mut self, tx: &Value) -> Result<(), &'static str> {
        let key = escrow_key(tx)?;
        let entry = self.escrows.get(&key).ok_or("tecNO_TARGET")?;

        if entry
            .cancel_after
            .map_or(true, |cancel_after| self.close_time <= cancel_after)
        {
            return Err("tecNO_PERMISSION");
        }

        let entry = self.escrows.remove(&key).ok_or("tecNO_TARGET")?;
        self.credit(&entry.owner, entry.amount);

        Ok(())
    }

    fn credit(&mut self, account: &AccountId, amount: Drops) {
        if let Some(account) = self.accounts.get_mut(account) {
            account.balance = Drops::from_drops(account.balance.as_drops() + amount.as_drops());
        }
    }
}

fn escrow_key(tx: &Value) -> Result<(AccountId, u32), &'static str> {
    let owner = tx["Owner"]
        .as_str()
        .and_then(|owner| AccountId::from_str(owner).ok())
        .ok_or("temMALFORMED")?;
    let offer_sequence = tx["OfferSequence"]
        .as_u64()
        .and_then(|sequence| u32::try_from(sequence).ok())
        .ok_or("temMALFORMED")?;

    Ok((owner, offer_sequence))
}

#[async_trait]
impl XrplLedger for FakeXrpl {
    async fn submit(&self, tx_json: Value, secret: &str) -> anyhow::Result<Submission> {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.submissions += 1;

        let account = tx_json["Account"]
            .as_str()
            .map(AccountId::from_str)
            .transpose()?
            .ok_or_else(|| anyhow::anyhow!("missing Account"))?;
        let sequence = match ledger.accounts.get(&account) {
            Some(signer) if signer.secret == secret => signer.sequence,
            _ => {
                return Ok(Submission {
                    engine_result: "tefBAD_AUTH".to_owned(),
                    tx_hash: String::new(),
                    sequence: None,
                })
            }
        };
        let tx_hash = hex::encode_upper(
            sha256::Hash::hash(format!("{}:{}", account, sequence).as_bytes()).to_byte_array(),
        );

        let engine_result = ledger.apply(&account, sequence, &tx_hash, &tx_json);

        // Claimed and successful transactions consume a sequence and make it
        // into the ledger, the others are not applied at all.
        if engine_result.starts_with("tes") || engine_result.starts_with("tec") {
            if let Some(signer) = ledger.accounts.get_mut(&account) {
                signer.sequence += 1;
            }
            ledger.transactions.insert(
                tx_hash.clone(),
                ValidatedTransaction {
                    engine_result: engine_result.clone(),
                    sequence: Some(sequence),
                },
            );
        }

        Ok(Submission {
            engine_result,
            tx_hash,
            sequence: Some(sequence),
        })
    }

    async fn validated_transaction(
        &self,
        tx_hash: &str,
    ) -> anyhow::Result<Option<ValidatedTransaction>> {
        Ok(self.ledger.lock().unwrap().transactions.get(tx_hash).cloned())
    }

    async fn escrow_entry(
        &self,
        owner: &AccountId,
        offer_sequence: u32,
    ) -> anyhow::Result<Option<EscrowEntry>> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .escrows
            .get(&(owner.clone(), offer_sequence))
            .cloned())
    }

    async fn escrows_of(&self, owner: &AccountId) -> anyhow::Result<Vec<EscrowEntry>> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .escrows
            .values()
            .filter(|entry| &entry.owner == owner)
            .cloned()
            .collect())
    }

    async fn escrow_finish_fulfillment(
        &self,
        owner: &AccountId,
        offer_sequence: u32,
    ) -> anyhow::Result<Option<String>> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .fulfillments
            .get(&(owner.clone(), offer_sequence))
            .cloned())
    }

    async fn ledger_close_time(&self) -> anyhow::Result<RippleTime> {
        let mut ledger = self.ledger.lock().unwrap();
        let close_time = ledger.close_time;
        ledger.close_time = close_time.plus(self.tick);

        Ok(close_time)
    }

    async fn wallet_propose(&self) -> anyhow::Result<Wallet> {
        Ok(self.new_wallet(Drops::from_drops(0)))
    }
}

/// Keeps every saved value, newest last.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    saved: Mutex<Vec<(SwapId, Value)>>,
}

impl InMemoryStore {
    /// Variant names of the states saved for `swap_id`, oldest first.
    pub fn history(&self, swap_id: SwapId) -> Vec<String> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == swap_id)
            .filter_map(|(_, value)| match value {
                Value::String(name) => Some(name.clone()),
                Value::Object(fields) => fields.keys().next().cloned(),
                _ => None,
            })
            .collect()
    }
}

impl<T> Load<T> for InMemoryStore
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn load(&self, swap_id: SwapId) -> anyhow::Result<Option<T>> {
        let saved = self.saved.lock().unwrap();

        saved
            .iter()
            .rev()
            .find(|(id, _)| *id == swap_id)
            .map(|(_, value)| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(Into::into)
    }
}

#[async_trait]
impl<T> Save<T> for InMemoryStore
where
    T: Serialize + Send + Sync + 'static,
{
    async fn save(&self, elem: T, swap_id: SwapId) -> anyhow::Result<()> {
        let value = serde_json::to_value(&elem)?;
        self.saved.lock().unwrap().push((swap_id, value));

        Ok(())
    }
}
