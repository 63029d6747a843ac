//! Storage abstraction for the ledger plus the transaction scope used by postings.

use crate::core::error::StoreError;
use crate::core::model::{LedgerEntry, Reward, RewardId, Stock, StockPrice, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Writes that must land together or not at all.
#[derive(Debug, Default, Clone)]
pub struct WriteSet {
    /// Inserted only when the symbol is still unknown at commit time.
    pub stocks: Vec<Stock>,
    pub rewards: Vec<Reward>,
    pub entries: Vec<LedgerEntry>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty() && self.rewards.is_empty() && self.entries.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RowCounts {
    pub stocks: usize,
    pub rewards: usize,
    pub ledger_entries: usize,
    pub prices: usize,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn stock(&self, symbol: &str) -> Result<Option<Stock>, StoreError>;

    async fn active_stocks(&self) -> Result<Vec<Stock>, StoreError>;

    async fn reward(&self, id: RewardId) -> Result<Option<Reward>, StoreError>;

    async fn reward_by_key(&self, key: &str) -> Result<Option<Reward>, StoreError>;

    async fn rewards_for_user(&self, user_id: UserId) -> Result<Vec<Reward>, StoreError>;

    /// Entries of one reward in posting order.
    async fn ledger_for_reward(&self, reward_id: RewardId)
    -> Result<Vec<LedgerEntry>, StoreError>;

    /// Appends to the price time series; never replaces earlier observations.
    async fn append_price(&self, price: StockPrice) -> Result<(), StoreError>;

    async fn latest_price(&self, symbol: &str) -> Result<Option<StockPrice>, StoreError>;

    /// Latest observation of every symbol that has one.
    async fn latest_prices(&self) -> Result<HashMap<String, StockPrice>, StoreError>;

    /// Applies the write set atomically. Fails with `UniqueViolation` and applies
    /// nothing if any reward reuses an idempotency key.
    async fn commit(&self, writes: WriteSet) -> Result<(), StoreError>;

    async fn row_counts(&self) -> Result<RowCounts, StoreError>;
}

/// Staged writes over a store with read-your-writes lookups.
///
/// Nothing reaches the store until [`Transaction::commit`]; dropping or rolling back
/// discards every staged row.
pub struct Transaction<'a> {
    store: &'a dyn LedgerStore,
    writes: WriteSet,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn begin(store: &'a dyn LedgerStore) -> Self {
        Transaction {
            store,
            writes: WriteSet::default(),
            finished: false,
        }
    }

    pub async fn stock(&self, symbol: &str) -> Result<Option<Stock>, StoreError> {
        if let Some(staged) = self.writes.stocks.iter().find(|s| s.symbol == symbol) {
            return Ok(Some(staged.clone()));
        }
        self.store.stock(symbol).await
    }

    pub async fn reward_by_key(&self, key: &str) -> Result<Option<Reward>, StoreError> {
        if let Some(staged) = self
            .writes
            .rewards
            .iter()
            .find(|r| r.idempotency_key.as_deref() == Some(key))
        {
            return Ok(Some(staged.clone()));
        }
        self.store.reward_by_key(key).await
    }

    pub async fn latest_price(&self, symbol: &str) -> Result<Option<StockPrice>, StoreError> {
        self.store.latest_price(symbol).await
    }

    pub fn stage_stock(&mut self, stock: Stock) {
        self.writes.stocks.push(stock);
    }

    pub fn stage_reward(&mut self, reward: Reward) {
        self.writes.rewards.push(reward);
    }

    pub fn stage_entries(&mut self, entries: impl IntoIterator<Item = LedgerEntry>) {
        self.writes.entries.extend(entries);
    }

    pub fn staged(&self) -> &WriteSet {
        &self.writes
    }

    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        if writes.is_empty() {
            return Ok(());
        }
        self.store.commit(writes).await
    }

    pub fn rollback(mut self) {
        self.finished = true;
        debug!(
            stocks = self.writes.stocks.len(),
            rewards = self.writes.rewards.len(),
            entries = self.writes.entries.len(),
            "Transaction rolled back"
        );
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.writes.is_empty() {
            debug!(
                rewards = self.writes.rewards.len(),
                entries = self.writes.entries.len(),
                "Transaction dropped without commit, staged writes discarded"
            );
        }
    }
}
