use crate::{
    bitcoin::{BitcoinLedger, BroadcastError, ObservedTransaction, Utxo},
    jsonrpc::{self, Credentials, JsonRpcError},
    ledger, Timestamp,
};
use anyhow::Context;
use async_trait::async_trait;
use bitcoin::{
    consensus::encode::{deserialize_hex, serialize_hex},
    Address, Amount, Block, BlockHash, OutPoint, Transaction, Txid,
};
use serde::{de, Deserialize, Deserializer};
use serde_json::json;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

/// `RPC_INVALID_ADDRESS_OR_KEY`, what bitcoind answers for unknown
/// transactions and blocks.
const NOT_FOUND: i64 = -5;

/// Blocks below the last scanned one that are searched again, in case they
/// were replaced by a reorg.
const RESCAN_DEPTH: u32 = 6;

#[derive(Debug, Clone)]
pub struct BitcoindConnector {
    client: jsonrpc::Client,
    cursor: ScanCursor,
}

/// The first block not yet searched for a spend of an outpoint, so repeated
/// polls only fetch new blocks.
#[derive(Debug, Clone, Default)]
struct ScanCursor {
    next_heights: Arc<Mutex<HashMap<OutPoint, u32>>>,
}

impl ScanCursor {
    fn start(&self, outpoint: OutPoint, from_height: u32) -> u32 {
        let next = self
            .next_heights
            .lock()
            .ok()
            .and_then(|heights| heights.get(&outpoint).copied());

        match next {
            Some(next) => from_height.max(next.saturating_sub(RESCAN_DEPTH)),
            None => from_height,
        }
    }

    fn scanned(&self, outpoint: OutPoint, height: u32) {
        if let Ok(mut heights) = self.next_heights.lock() {
            let next = heights.entry(outpoint).or_insert(0);
            *next = (*next).max(height + 1);
        }
    }

    fn forget(&self, outpoint: &OutPoint) {
        if let Ok(mut heights) = self.next_heights.lock() {
            heights.remove(outpoint);
        }
    }
}

impl BitcoindConnector {
    pub fn new(node_url: url::Url, credentials: Option<Credentials>) -> Self {
        let client = jsonrpc::Client::new(node_url);
        let client = match credentials {
            Some(credentials) => client.with_credentials(credentials),
            None => client,
        };

        Self {
            client,
            cursor: ScanCursor::default(),
        }
    }

    pub async fn chain_info(&self) -> anyhow::Result<ChainInfo> {
        let chain_info = self
            .client
            .send::<_, ChainInfo>("getblockchaininfo", json!([]))
            .await?;

        tracing::trace!("Fetched chain info: {:?} from bitcoind", chain_info);

        Ok(chain_info)
    }

    async fn block_hash(&self, height: u32) -> anyhow::Result<BlockHash> {
        self.client.send("getblockhash", json!([height])).await
    }

    async fn block_header(&self, block_hash: &BlockHash) -> anyhow::Result<BlockHeader> {
        self.client
            .send("getblockheader", json!([block_hash, true]))
            .await
    }

    async fn block(&self, block_hash: &BlockHash) -> anyhow::Result<Block> {
        let hex = self
            .client
            .send::<_, String>("getblock", json!([block_hash, 0]))
            .await?;

        deserialize_hex(&hex).context("failed to deserialize bytes as block")
    }
}

#[async_trait]
impl BitcoinLedger for BitcoindConnector {
    #[tracing::instrument(skip(self, transaction), fields(txid = %transaction.compute_txid()))]
    async fn submit_raw_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Txid, BroadcastError> {
        let result = self
            .client
            .send::<_, Txid>("sendrawtransaction", json!([serialize_hex(transaction)]))
            .await;

        match result {
            Ok(txid) => Ok(txid),
            Err(e) => match e.downcast_ref::<JsonRpcError>() {
                Some(rejection) => Err(BroadcastError::Rejected(rejection.message.clone())),
                None => Err(BroadcastError::Connection(e)),
            },
        }
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_raw_transaction(
        &self,
        txid: Txid,
    ) -> anyhow::Result<Option<ObservedTransaction>> {
        let result = self
            .client
            .send::<_, RawTransaction>("getrawtransaction", json!([txid, true]))
            .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        let transaction = deserialize_hex(&raw.hex).context("failed to deserialize transaction")?;
        let height = match raw.blockhash {
            Some(block_hash) => Some(self.block_header(&block_hash).await?.height),
            None => None,
        };

        Ok(Some(ObservedTransaction {
            transaction,
            height,
        }))
    }

    #[tracing::instrument(skip(self, address), fields(%address))]
    async fn fetch_unspent_output(&self, address: &Address) -> anyhow::Result<Option<Utxo>> {
        let descriptor = format!("addr({})", address);
        let scan = self
            .client
            .send::<_, TxOutSetScan>("scantxoutset", json!(["start", [descriptor]]))
            .await?;

        let utxo = scan.unspents.into_iter().next().map(|unspent| Utxo {
            outpoint: OutPoint {
                txid: unspent.txid,
                vout: unspent.vout,
            },
            amount: unspent.amount,
            height: Some(unspent.height).filter(|height| *height > 0),
        });

        Ok(utxo)
    }

    #[tracing::instrument(skip(self))]
    async fn is_unspent(&self, outpoint: OutPoint) -> anyhow::Result<bool> {
        let output = self
            .client
            .send::<_, Option<serde_json::Value>>(
                "gettxout",
                json!([outpoint.txid, outpoint.vout, true]),
            )
            .await?;

        Ok(output.is_some())
    }

    #[tracing::instrument(skip(self))]
    async fn find_spending_transaction(
        &self,
        outpoint: OutPoint,
        from_height: u32,
    ) -> anyhow::Result<Option<ObservedTransaction>> {
        let tip = self.block_height().await?;
        let start = self.cursor.start(outpoint, from_height);

        for height in start..=tip {
            let block_hash = self.block_hash(height).await?;
            let block = self.block(&block_hash).await?;

            let spend = block.txdata.into_iter().find(|transaction| {
                transaction
                    .input
                    .iter()
                    .any(|input| input.previous_output == outpoint)
            });

            if let Some(transaction) = spend {
                tracing::debug!("found spend of {} in block {}", outpoint, block_hash);
                self.cursor.forget(&outpoint);

                return Ok(Some(ObservedTransaction {
                    transaction,
                    height: Some(height),
                }));
            }

            self.cursor.scanned(outpoint, height);
        }

        Ok(None)
    }

    async fn block_height(&self) -> anyhow::Result<u32> {
        self.client.send("getblockcount", json!([])).await
    }

    async fn median_time_past(&self, height: u32) -> anyhow::Result<Timestamp> {
        let block_hash = self.block_hash(height).await?;
        let header = self.block_header(&block_hash).await?;

        Ok(Timestamp::from(header.mediantime))
    }

    #[tracing::instrument(skip(self, address, amount), fields(%address, %amount))]
    async fn send_to_address(&self, address: &Address, amount: Amount) -> anyhow::Result<Txid> {
        self.client
            .send(
                "sendtoaddress",
                json!([address.to_string(), amount.to_btc()]),
            )
            .await
    }
}

fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<JsonRpcError>()
        .map_or(false, |error| error.code == NOT_FOUND)
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChainInfo {
    #[serde(deserialize_with = "deserialize_bitcoind_values")]
    pub chain: ledger::Bitcoin,
    pub blocks: u32,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    hex: String,
    #[serde(default)]
    blockhash: Option<BlockHash>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    height: u32,
    mediantime: u32,
}

#[derive(Debug, Deserialize)]
struct TxOutSetScan {
    unspents: Vec<Unspent>,
}

#[derive(Debug, Deserialize)]
struct Unspent {
    txid: Txid,
    vout: u32,
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    amount: Amount,
    height: u32,
}

pub fn deserialize_bitcoind_values<'de, D>(deserializer: D) -> Result<ledger::Bitcoin, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;

    impl<'de> de::Visitor<'de> for Visitor {
        type Value = ledger::Bitcoin;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a bitcoin network")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            match v {
                "main" => Ok(ledger::Bitcoin::Mainnet),
                "test" => Ok(ledger::Bitcoin::Testnet),
                "regtest" => Ok(ledger::Bitcoin::Regtest),
                unknown => Err(E::custom(format!("unknown bitcoin network {}", unknown))),
            }
        }
    }

    deserializer.deserialize_str(Visitor)
}
