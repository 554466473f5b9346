use crate::{
    jsonrpc,
    xrpl::{AccountId, Drops, EscrowEntry, Submission, ValidatedTransaction, Wallet, XrplLedger},
    Condition, RippleTime,
};
use anyhow::Context;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::{fmt::Debug, future::Future};

/// Node errors meaning "does not exist (yet)".
const NOT_FOUND: &[&str] = &["txnNotFound", "entryNotFound", "objectNotFound"];

#[derive(Debug, Clone)]
pub struct RippledConnector {
    client: jsonrpc::Client,
}

impl RippledConnector {
    pub fn new(node_url: url::Url) -> Self {
        Self {
            client: jsonrpc::Client::new(node_url),
        }
    }

    /// rippled wraps every answer in `result` and reports failures inside it.
    async fn request<Res>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<Result<Res, RippledError>>
    where
        Res: Debug + DeserializeOwned,
    {
        let result = self
            .client
            .send::<_, RippledResult<Res>>(method, json!([params]))
            .await?;

        Ok(match result {
            RippledResult::Failure(error) => Err(error),
            RippledResult::Success(result) => Ok(result),
        })
    }

    async fn request_optional<Res>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<Option<Res>>
    where
        Res: Debug + DeserializeOwned,
    {
        match self.request(method, params).await? {
            Ok(result) => Ok(Some(result)),
            Err(error) if NOT_FOUND.contains(&error.error.as_str()) => Ok(None),
            Err(error) => Err(anyhow::Error::new(error)),
        }
    }

    async fn request_required<Res>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<Res>
    where
        Res: Debug + DeserializeOwned,
    {
        self.request(method, params)
            .await?
            .with_context(|| format!("rippled request {} failed", method))
    }
}

#[async_trait]
impl XrplLedger for RippledConnector {
    #[tracing::instrument(skip(self, tx_json, secret))]
    async fn submit(&self, tx_json: serde_json::Value, secret: &str) -> anyhow::Result<Submission> {
        let result = self
            .request_required::<SubmitResult>(
                "submit",
                json!({
                    "tx_json": tx_json,
                    "secret": secret,
                    "fail_hard": true,
                }),
            )
            .await?;

        tracing::debug!(
            "engine result {}: {}",
            result.engine_result,
            result.engine_result_message.as_deref().unwrap_or_default()
        );

        Ok(Submission {
            engine_result: result.engine_result,
            tx_hash: result.tx_json.hash,
            sequence: result.tx_json.sequence,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn validated_transaction(
        &self,
        tx_hash: &str,
    ) -> anyhow::Result<Option<ValidatedTransaction>> {
        let transaction = self
            .request_optional::<TxResult>("tx", json!({ "transaction": tx_hash }))
            .await?;

        Ok(transaction
            .filter(|transaction| transaction.validated)
            .and_then(|transaction| {
                let sequence = transaction.sequence;

                transaction.meta.map(|meta| ValidatedTransaction {
                    engine_result: meta.transaction_result,
                    sequence,
                })
            }))
    }

    #[tracing::instrument(skip(self))]
    async fn escrow_entry(
        &self,
        owner: &AccountId,
        offer_sequence: u32,
    ) -> anyhow::Result<Option<EscrowEntry>> {
        let entry = self
            .request_optional::<LedgerEntryResult>(
                "ledger_entry",
                json!({
                    "escrow": { "owner": owner.to_string(), "seq": offer_sequence },
                    "ledger_index": "validated",
                }),
            )
            .await?;

        entry.map(|entry| entry.node.into_entry()).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn escrows_of(&self, owner: &AccountId) -> anyhow::Result<Vec<EscrowEntry>> {
        let params = json!({
            "account": owner.to_string(),
            "type": "escrow",
            "ledger_index": "validated",
        });

        let mut nodes = Vec::new();
        find_in_pages(
            move |marker| {
                self.request_required::<AccountObjectsResult>(
                    "account_objects",
                    with_marker(params.clone(), marker),
                )
            },
            |node: EscrowNode| {
                nodes.push(node);
                None::<()>
            },
        )
        .await?;

        nodes.into_iter().map(EscrowNode::into_entry).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn escrow_finish_fulfillment(
        &self,
        owner: &AccountId,
        offer_sequence: u32,
    ) -> anyhow::Result<Option<String>> {
        let params = json!({
            "account": owner.to_string(),
            "ledger_index_min": -1,
            "ledger_index_max": -1,
        });
        let owner = owner.to_string();

        find_in_pages(
            move |marker| {
                self.request_required::<AccountTxResult>(
                    "account_tx",
                    with_marker(params.clone(), marker),
                )
            },
            |entry: AccountTransaction| entry.finish_fulfillment(&owner, offer_sequence),
        )
        .await
    }

    async fn ledger_close_time(&self) -> anyhow::Result<RippleTime> {
        let ledger = self
            .request_required::<LedgerResult>("ledger", json!({ "ledger_index": "validated" }))
            .await?;

        Ok(RippleTime::from_seconds(ledger.ledger.close_time))
    }

    async fn wallet_propose(&self) -> anyhow::Result<Wallet> {
        let proposal = self
            .request_required::<WalletProposal>("wallet_propose", json!({}))
            .await?;

        Ok(Wallet {
            address: proposal.account_id.parse()?,
            secret: proposal.master_seed,
            public_key: Some(proposal.public_key_hex),
        })
    }
}

/// A result rippled may split over several calls. The marker of one page is
/// passed back to fetch the next.
trait Paged {
    type Item;

    fn into_page(self) -> (Vec<Self::Item>, Option<serde_json::Value>);
}

fn with_marker(
    mut params: serde_json::Value,
    marker: Option<serde_json::Value>,
) -> serde_json::Value {
    if let (Some(marker), Some(params)) = (marker, params.as_object_mut()) {
        params.insert("marker".to_owned(), marker);
    }

    params
}

/// Fetches pages until `find` yields a value or the last page was searched.
async fn find_in_pages<P, T, F, Fut>(
    mut fetch: F,
    mut find: impl FnMut(P::Item) -> Option<T>,
) -> anyhow::Result<Option<T>>
where
    P: Paged,
    F: FnMut(Option<serde_json::Value>) -> Fut,
    Fut: Future<Output = anyhow::Result<P>>,
{
    let mut marker = None;

    loop {
        let (items, next) = fetch(marker.take()).await?.into_page();

        if let Some(found) = items.into_iter().find_map(&mut find) {
            return Ok(Some(found));
        }

        match next {
            Some(next) => {
                tracing::trace!("fetching next page at {}", next);
                marker = Some(next);
            }
            None => return Ok(None),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RippledResult<T> {
    Failure(RippledError),
    Success(T),
}

#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq)]
#[error("rippled answered {error}: {}", .error_message.as_deref().unwrap_or_default())]
pub struct RippledError {
    pub error: String,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    engine_result: String,
    #[serde(default)]
    engine_result_message: Option<String>,
    tx_json: SubmittedTx,
}

#[derive(Debug, Deserialize)]
struct SubmittedTx {
    hash: String,
    #[serde(rename = "Sequence", default)]
    sequence: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    #[serde(default)]
    validated: bool,
    #[serde(rename = "Sequence", default)]
    sequence: Option<u32>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(rename = "TransactionResult")]
    transaction_result: String,
}

#[derive(Debug, Deserialize)]
struct LedgerEntryResult {
    node: EscrowNode,
}

#[derive(Debug, Deserialize)]
struct AccountObjectsResult {
    account_objects: Vec<EscrowNode>,
    #[serde(default)]
    marker: Option<serde_json::Value>,
}

impl Paged for AccountObjectsResult {
    type Item = EscrowNode;

    fn into_page(self) -> (Vec<EscrowNode>, Option<serde_json::Value>) {
        (self.account_objects, self.marker)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EscrowNode {
    account: String,
    destination: String,
    amount: String,
    #[serde(default)]
    condition: Option<Condition>,
    #[serde(default)]
    cancel_after: Option<u32>,
    #[serde(default)]
    finish_after: Option<u32>,
    #[serde(rename = "PreviousTxnID", default)]
    previous_txn_id: Option<String>,
}

impl EscrowNode {
    fn into_entry(self) -> anyhow::Result<EscrowEntry> {
        Ok(EscrowEntry {
            owner: self.account.parse()?,
            destination: self.destination.parse()?,
            amount: self.amount.parse::<Drops>()?,
            condition: self.condition,
            cancel_after: self.cancel_after.map(RippleTime::from_seconds),
            finish_after: self.finish_after.map(RippleTime::from_seconds),
            created_by: self.previous_txn_id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccountTxResult {
    transactions: Vec<AccountTransaction>,
    #[serde(default)]
    marker: Option<serde_json::Value>,
}

impl Paged for AccountTxResult {
    type Item = AccountTransaction;

    fn into_page(self) -> (Vec<AccountTransaction>, Option<serde_json::Value>) {
        (self.transactions, self.marker)
    }
}

#[derive(Debug, Deserialize)]
struct AccountTransaction {
    #[serde(alias = "tx_json")]
    tx: HistoricTx,
    #[serde(default)]
    meta: Option<Meta>,
    #[serde(default)]
    validated: bool,
}

impl AccountTransaction {
    /// The fulfillment if this is the validated, successful EscrowFinish of
    /// `(owner, offer_sequence)`.
    fn finish_fulfillment(self, owner: &str, offer_sequence: u32) -> Option<String> {
        let succeeded = self
            .meta
            .as_ref()
            .map_or(false, |meta| meta.transaction_result == "tesSUCCESS");
        let tx = self.tx;

        if self.validated
            && succeeded
            && tx.transaction_type == "EscrowFinish"
            && tx.owner.as_deref() == Some(owner)
            && tx.offer_sequence == Some(offer_sequence)
        {
            tx.fulfillment
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HistoricTx {
    transaction_type: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    offer_sequence: Option<u32>,
    #[serde(default)]
    fulfillment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LedgerResult {
    ledger: ClosedLedger,
}

#[derive(Debug, Deserialize)]
struct ClosedLedger {
    close_time: u32,
}

#[derive(Debug, Deserialize)]
struct WalletProposal {
    account_id: String,
    master_seed: String,
    public_key_hex: String,
}
