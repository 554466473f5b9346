use crate::swap::SwapRecord;
use anyhow::{anyhow, Context};
use serde::{de::DeserializeOwned, Serialize};
use xcswap::{
    swap::{Load, Save},
    SwapId,
};

/// Durable storage of swaps and their protocol states.
///
/// Records are written once when a swap is created. States are replaced on
/// every transition and flushed before the transition counts as done.
#[derive(Debug)]
pub struct Database {
    db: sled::Db,
    swaps: sled::Tree,
    states: sled::Tree,
    #[cfg(test)]
    tmp_dir: tempfile::TempDir,
}

impl Database {
    const SWAPS: &'static str = "swaps";
    const STATES: &'static str = "states";

    #[cfg(not(test))]
    pub fn new(path: &std::path::Path) -> anyhow::Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("could not open the DB at {}", path.display()))?;

        Ok(Database {
            swaps: db.open_tree(Self::SWAPS)?,
            states: db.open_tree(Self::STATES)?,
            db,
        })
    }

    #[cfg(test)]
    pub fn new_test() -> anyhow::Result<Self> {
        let tmp_dir = tempfile::TempDir::new()?;
        let db = sled::open(tmp_dir.path())
            .with_context(|| format!("could not open the DB at {}", tmp_dir.path().display()))?;

        Ok(Database {
            swaps: db.open_tree(Self::SWAPS)?,
            states: db.open_tree(Self::STATES)?,
            db,
            tmp_dir,
        })
    }

    /// Stores a new swap under the id of its offer.
    pub async fn insert_swap(&self, record: &SwapRecord) -> anyhow::Result<()> {
        let swap_id = record.offer.swap_id;
        let key = serialize(&swap_id)?;
        let new_value = serialize(record).context("could not serialize new swap value")?;

        self.swaps
            .compare_and_swap(key, Option::<Vec<u8>>::None, Some(new_value))
            .context("could not write in the DB")?
            .map_err(|_| anyhow!("swap {} is already stored", swap_id))?;

        self.flush().await
    }

    pub fn all_swaps(&self) -> anyhow::Result<Vec<(SwapId, SwapRecord)>> {
        self.swaps
            .iter()
            .map(|item| {
                let (key, value) = item.context("could not retrieve data")?;
                let swap_id = deserialize::<SwapId>(&key).context("could not deserialize swap id")?;
                let record = deserialize::<SwapRecord>(&value)
                    .with_context(|| format!("could not deserialize swap {}", swap_id))?;

                Ok((swap_id, record))
            })
            .collect()
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.db
            .flush_async()
            .await
            .map(|_| ())
            .context("could not flush db")
    }
}

impl<T> Load<T> for Database
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn load(&self, swap_id: SwapId) -> anyhow::Result<Option<T>> {
        let key = serialize(&swap_id)?;

        self.states
            .get(&key)?
            .map(|state| deserialize(&state).context("could not deserialize state"))
            .transpose()
    }
}

#[async_trait::async_trait]
impl<T> Save<T> for Database
where
    T: Serialize + Send + Sync + 'static,
{
    async fn save(&self, state: T, swap_id: SwapId) -> anyhow::Result<()> {
        let key = serialize(&swap_id)?;
        let new_value = serialize(&state).context("could not serialize new state")?;
        let old_value = self.states.get(&key)?;

        self.states
            .compare_and_swap(key, old_value, Some(new_value))
            .context("could not write in the DB")?
            .context("stored state somehow changed, aborting saving")?;

        self.flush().await
    }
}

pub fn serialize<T>(t: &T) -> anyhow::Result<Vec<u8>>
where
    T: Serialize,
{
    Ok(serde_cbor::to_vec(t)?)
}

pub fn deserialize<T>(v: &[u8]) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    Ok(serde_cbor::from_slice(v)?)
}
