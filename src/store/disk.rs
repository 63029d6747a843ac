use crate::core::error::StoreError;
use crate::core::model::{LedgerEntry, Reward, RewardId, Stock, StockPrice, UserId};
use crate::core::store::{LedgerStore, RowCounts, WriteSet};
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

impl From<fjall::Error> for StoreError {
    fn from(e: fjall::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// `symbol \0 observed_at(ms, order preserving) id`, so a prefix scan over one
/// symbol yields its series in time order.
fn price_key(price: &StockPrice) -> Vec<u8> {
    let mut key = price_prefix(&price.stock_symbol);
    let ts = (price.observed_at.timestamp_millis() as u64) ^ (1 << 63);
    key.extend_from_slice(&ts.to_be_bytes());
    key.extend_from_slice(Uuid::new_v4().as_bytes());
    key
}

fn price_prefix(symbol: &str) -> Vec<u8> {
    let mut key = symbol.as_bytes().to_vec();
    key.push(0);
    key
}

fn ledger_key(entry: &LedgerEntry, position: usize) -> Vec<u8> {
    let mut key = entry.reward_id.as_bytes().to_vec();
    key.extend_from_slice(&(position as u32).to_be_bytes());
    key
}

fn user_reward_key(user_id: UserId, reward_id: RewardId) -> Vec<u8> {
    let mut key = user_id.as_bytes().to_vec();
    key.extend_from_slice(reward_id.as_bytes());
    key
}

/// Ledger store persisted in a fjall keyspace, one partition per table.
pub struct DiskStore {
    keyspace: Keyspace,
    stocks: PartitionHandle,
    rewards: PartitionHandle,
    reward_keys: PartitionHandle,
    user_rewards: PartitionHandle,
    ledger: PartitionHandle,
    prices: PartitionHandle,
    // Serializes constraint checks with the batch that follows them.
    commit_lock: Mutex<()>,
}

impl DiskStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(db_path)?;
        let keyspace = Config::new(db_path.join("ledger")).open()?;
        let open = |name: &str| keyspace.open_partition(name, PartitionCreateOptions::default());
        let stocks = open("stocks")?;
        let rewards = open("rewards")?;
        let reward_keys = open("reward_keys")?;
        let user_rewards = open("user_rewards")?;
        let ledger = open("ledger")?;
        let prices = open("prices")?;

        Ok(Self {
            keyspace,
            stocks,
            rewards,
            reward_keys,
            user_rewards,
            ledger,
            prices,
            commit_lock: Mutex::new(()),
        })
    }

    fn read_reward(&self, id: RewardId) -> Result<Option<Reward>, StoreError> {
        self.rewards
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
}

fn uuid_from(bytes: &[u8]) -> Result<Uuid, StoreError> {
    Uuid::from_slice(bytes).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl LedgerStore for DiskStore {
    async fn stock(&self, symbol: &str) -> Result<Option<Stock>, StoreError> {
        self.stocks
            .get(symbol.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    async fn active_stocks(&self) -> Result<Vec<Stock>, StoreError> {
        let mut stocks = Vec::new();
        for item in self.stocks.iter() {
            let (_, value) = item?;
            let stock: Stock = decode(&value)?;
            if stock.active {
                stocks.push(stock);
            }
        }
        Ok(stocks)
    }

    async fn reward(&self, id: RewardId) -> Result<Option<Reward>, StoreError> {
        self.read_reward(id)
    }

    async fn reward_by_key(&self, key: &str) -> Result<Option<Reward>, StoreError> {
        match self.reward_keys.get(key.as_bytes())? {
            Some(id) => self.read_reward(uuid_from(&id)?),
            None => Ok(None),
        }
    }

    async fn rewards_for_user(&self, user_id: UserId) -> Result<Vec<Reward>, StoreError> {
        let mut rewards = Vec::new();
        for item in self.user_rewards.prefix(user_id.as_bytes()) {
            let (key, _) = item?;
            if let Some(reward) = self.read_reward(uuid_from(&key[16..])?)? {
                rewards.push(reward);
            }
        }
        rewards.sort_by_key(|r| (r.rewarded_at, r.created_at));
        Ok(rewards)
    }

    async fn ledger_for_reward(
        &self,
        reward_id: RewardId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut entries = Vec::new();
        for item in self.ledger.prefix(reward_id.as_bytes()) {
            let (_, value) = item?;
            entries.push(decode(&value)?);
        }
        Ok(entries)
    }

    async fn append_price(&self, price: StockPrice) -> Result<(), StoreError> {
        self.prices.insert(price_key(&price), encode(&price)?)?;
        debug!(symbol = %price.stock_symbol, price = %price.price, "Price APPEND");
        Ok(())
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<StockPrice>, StoreError> {
        match self.prices.prefix(price_prefix(symbol)).next_back() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    async fn latest_prices(&self) -> Result<HashMap<String, StockPrice>, StoreError> {
        // Keys sort by symbol then time, so the last row seen per symbol wins.
        let mut latest = HashMap::new();
        for item in self.prices.iter() {
            let (_, value) = item?;
            let price: StockPrice = decode(&value)?;
            latest.insert(price.stock_symbol.clone(), price);
        }
        Ok(latest)
    }

    async fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        let _guard = self.commit_lock.lock().await;

        let mut batch_keys = HashSet::new();
        for reward in &writes.rewards {
            if let Some(key) = &reward.idempotency_key {
                if self.reward_keys.contains_key(key.as_bytes())?
                    || !batch_keys.insert(key.as_str())
                {
                    debug!(key = %key, "Commit rejected on idempotency key");
                    return Err(StoreError::UniqueViolation(key.clone()));
                }
            }
        }

        let mut batch = self.keyspace.batch();
        for stock in &writes.stocks {
            if !self.stocks.contains_key(stock.symbol.as_bytes())? {
                batch.insert(&self.stocks, stock.symbol.as_bytes().to_vec(), encode(stock)?);
            }
        }
        for reward in &writes.rewards {
            batch.insert(&self.rewards, reward.id.as_bytes().to_vec(), encode(reward)?);
            batch.insert(
                &self.user_rewards,
                user_reward_key(reward.user_id, reward.id),
                Vec::<u8>::new(),
            );
            if let Some(key) = &reward.idempotency_key {
                batch.insert(
                    &self.reward_keys,
                    key.as_bytes().to_vec(),
                    reward.id.as_bytes().to_vec(),
                );
            }
        }
        for (position, entry) in writes.entries.iter().enumerate() {
            batch.insert(&self.ledger, ledger_key(entry, position), encode(entry)?);
        }
        batch.commit()?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(
            rewards = writes.rewards.len(),
            entries = writes.entries.len(),
            "Commit applied"
        );
        Ok(())
    }

    async fn row_counts(&self) -> Result<RowCounts, StoreError> {
        let count = |partition: &PartitionHandle| -> Result<usize, StoreError> {
            let mut n = 0;
            for item in partition.iter() {
                item?;
                n += 1;
            }
            Ok(n)
        };
        Ok(RowCounts {
            stocks: count(&self.stocks)?,
            rewards: count(&self.rewards)?,
            ledger_entries: count(&self.ledger)?,
            prices: count(&self.prices)?,
        })
    }
}
