use crate::core::error::StoreError;
use crate::core::model::{LedgerEntry, Reward, RewardId, Stock, StockPrice, UserId};
use crate::core::store::{LedgerStore, RowCounts, WriteSet};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct Tables {
    stocks: HashMap<String, Stock>,
    rewards: HashMap<RewardId, Reward>,
    reward_keys: HashMap<String, RewardId>,
    ledger: Vec<LedgerEntry>,
    prices: HashMap<String, Vec<StockPrice>>,
}

/// In-memory ledger store, used for tests and throwaway runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a stock row outside any posting, e.g. to deactivate it.
    pub async fn put_stock(&self, stock: Stock) {
        let mut tables = self.inner.lock().await;
        tables.stocks.insert(stock.symbol.clone(), stock);
    }
}

fn latest_of(series: &[StockPrice]) -> Option<&StockPrice> {
    series.iter().max_by_key(|p| p.observed_at)
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn stock(&self, symbol: &str) -> Result<Option<Stock>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.stocks.get(symbol).cloned())
    }

    async fn active_stocks(&self) -> Result<Vec<Stock>, StoreError> {
        let tables = self.inner.lock().await;
        let mut stocks: Vec<Stock> = tables.stocks.values().filter(|s| s.active).cloned().collect();
        stocks.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(stocks)
    }

    async fn reward(&self, id: RewardId) -> Result<Option<Reward>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables.rewards.get(&id).cloned())
    }

    async fn reward_by_key(&self, key: &str) -> Result<Option<Reward>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .reward_keys
            .get(key)
            .and_then(|id| tables.rewards.get(id))
            .cloned())
    }

    async fn rewards_for_user(&self, user_id: UserId) -> Result<Vec<Reward>, StoreError> {
        let tables = self.inner.lock().await;
        let mut rewards: Vec<Reward> = tables
            .rewards
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rewards.sort_by_key(|r| (r.rewarded_at, r.created_at));
        Ok(rewards)
    }

    async fn ledger_for_reward(
        &self,
        reward_id: RewardId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.reward_id == reward_id)
            .cloned()
            .collect())
    }

    async fn append_price(&self, price: StockPrice) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        debug!(symbol = %price.stock_symbol, price = %price.price, "Price APPEND");
        tables
            .prices
            .entry(price.stock_symbol.clone())
            .or_default()
            .push(price);
        Ok(())
    }

    async fn latest_price(&self, symbol: &str) -> Result<Option<StockPrice>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .prices
            .get(symbol)
            .and_then(|series| latest_of(series))
            .cloned())
    }

    async fn latest_prices(&self) -> Result<HashMap<String, StockPrice>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .prices
            .iter()
            .filter_map(|(symbol, series)| latest_of(series).map(|p| (symbol.clone(), p.clone())))
            .collect())
    }

    async fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;

        // Check every constraint before touching any table.
        let mut batch_keys = HashSet::new();
        for reward in &writes.rewards {
            if let Some(key) = &reward.idempotency_key {
                if tables.reward_keys.contains_key(key) || !batch_keys.insert(key.as_str()) {
                    debug!(key = %key, "Commit rejected on idempotency key");
                    return Err(StoreError::UniqueViolation(key.clone()));
                }
            }
        }

        for stock in writes.stocks {
            tables.stocks.entry(stock.symbol.clone()).or_insert(stock);
        }
        for reward in writes.rewards {
            if let Some(key) = &reward.idempotency_key {
                tables.reward_keys.insert(key.clone(), reward.id);
            }
            tables.rewards.insert(reward.id, reward);
        }
        tables.ledger.extend(writes.entries);
        debug!("Commit applied");
        Ok(())
    }

    async fn row_counts(&self) -> Result<RowCounts, StoreError> {
        let tables = self.inner.lock().await;
        Ok(RowCounts {
            stocks: tables.stocks.len(),
            rewards: tables.rewards.len(),
            ledger_entries: tables.ledger.len(),
            prices: tables.prices.values().map(Vec::len).sum(),
        })
    }
}
