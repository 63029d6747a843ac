//! Read-side aggregation of reward history against the latest known prices.
//!
//! All views read whatever is committed at call time and value holdings at the
//! *current* latest price of each symbol. Historical valuation therefore does
//! not use the price prevailing on the reward date; it answers "what are the
//! units granted on day D worth now".
use crate::core::error::{StoreError, ValuationError};
use crate::core::model::{Reward, RewardId, StockPrice, UserId};
use crate::core::store::LedgerStore;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Aggregated position in one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub value: Decimal,
}

/// A single reward granted today, valued individually.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayHolding {
    pub reward_id: RewardId,
    pub symbol: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyValuation {
    pub date: NaiveDate,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolQuantity {
    pub symbol: String,
    pub total_qty: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardStats {
    pub today: Vec<SymbolQuantity>,
    pub portfolio_value: Decimal,
}

/// Start of the local calendar day containing `now`, as a UTC instant.
pub fn start_of_day(now: DateTime<Local>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map_or_else(|| now.with_timezone(&Utc), |ts| ts.with_timezone(&Utc))
}

/// Sums today's per-reward rows by symbol, ordered by symbol.
pub fn sum_by_symbol(items: &[TodayHolding]) -> Result<Vec<SymbolQuantity>, ValuationError> {
    let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.symbol.as_str()).or_default();
        *total = add(*total, item.quantity, &item.symbol)?;
    }
    Ok(totals
        .into_iter()
        .map(|(symbol, total_qty)| SymbolQuantity {
            symbol: symbol.to_string(),
            total_qty,
        })
        .collect())
}

fn price_of(prices: &HashMap<String, StockPrice>, symbol: &str) -> Decimal {
    prices.get(symbol).map_or(Decimal::ZERO, |p| p.price)
}

fn add(a: Decimal, b: Decimal, symbol: &str) -> Result<Decimal, ValuationError> {
    a.checked_add(b).ok_or_else(|| ValuationError::Overflow(symbol.to_string()))
}

fn value_of(quantity: Decimal, price: Decimal, symbol: &str) -> Result<Decimal, ValuationError> {
    quantity
        .checked_mul(price)
        .ok_or_else(|| ValuationError::Overflow(symbol.to_string()))
}

pub struct ValuationEngine {
    store: Arc<dyn LedgerStore>,
}

impl ValuationEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    async fn load(
        &self,
        user_id: UserId,
    ) -> Result<(Vec<Reward>, HashMap<String, StockPrice>), StoreError> {
        let rewards = self.store.rewards_for_user(user_id).await?;
        let prices = if rewards.is_empty() {
            HashMap::new()
        } else {
            self.store.latest_prices().await?
        };
        debug!(
            %user_id,
            rewards = rewards.len(),
            priced_symbols = prices.len(),
            "Loaded valuation inputs"
        );
        Ok((rewards, prices))
    }

    /// Current holdings per symbol, ordered by symbol. Unpriced symbols value at zero.
    pub async fn portfolio(&self, user_id: UserId) -> Result<Vec<Holding>, ValuationError> {
        let (rewards, prices) = self.load(user_id).await?;

        let mut quantities: BTreeMap<&str, Decimal> = BTreeMap::new();
        for reward in &rewards {
            let symbol = reward.stock_symbol.as_str();
            let total = quantities.entry(symbol).or_default();
            *total = add(*total, reward.quantity, symbol)?;
        }

        quantities
            .into_iter()
            .map(|(symbol, quantity)| {
                let price = price_of(&prices, symbol);
                Ok(Holding {
                    value: value_of(quantity, price, symbol)?,
                    symbol: symbol.to_string(),
                    quantity,
                    price,
                })
            })
            .collect()
    }

    pub async fn portfolio_value(&self, user_id: UserId) -> Result<Decimal, ValuationError> {
        self.portfolio(user_id)
            .await?
            .iter()
            .try_fold(Decimal::ZERO, |sum, h| add(sum, h.value, &h.symbol))
    }

    pub async fn today_holdings(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TodayHolding>, ValuationError> {
        self.today_holdings_as_of(user_id, Local::now()).await
    }

    /// Rewards granted on or after the start of the local day containing `now`.
    pub async fn today_holdings_as_of(
        &self,
        user_id: UserId,
        now: DateTime<Local>,
    ) -> Result<Vec<TodayHolding>, ValuationError> {
        let day_start = start_of_day(now);
        let (rewards, prices) = self.load(user_id).await?;

        rewards
            .into_iter()
            .filter(|r| r.rewarded_at >= day_start)
            .map(|r| {
                let price = price_of(&prices, &r.stock_symbol);
                Ok(TodayHolding {
                    reward_id: r.id,
                    value: value_of(r.quantity, price, &r.stock_symbol)?,
                    symbol: r.stock_symbol,
                    quantity: r.quantity,
                    price,
                })
            })
            .collect()
    }

    pub async fn historical_valuation(
        &self,
        user_id: UserId,
    ) -> Result<Vec<DailyValuation>, ValuationError> {
        self.historical_valuation_as_of(user_id, Local::now()).await
    }

    /// Per-date totals of rewards granted before today, dated by the UTC date of
    /// `rewarded_at`, each valued at its symbol's current latest price.
    pub async fn historical_valuation_as_of(
        &self,
        user_id: UserId,
        now: DateTime<Local>,
    ) -> Result<Vec<DailyValuation>, ValuationError> {
        let day_start = start_of_day(now);
        let (rewards, prices) = self.load(user_id).await?;

        let mut days: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for reward in rewards.iter().filter(|r| r.rewarded_at < day_start) {
            let symbol = reward.stock_symbol.as_str();
            let value = value_of(reward.quantity, price_of(&prices, symbol), symbol)?;
            let total = days.entry(reward.rewarded_at.date_naive()).or_default();
            *total = add(*total, value, symbol)?;
        }

        Ok(days
            .into_iter()
            .map(|(date, total_value)| DailyValuation { date, total_value })
            .collect())
    }

    pub async fn stats(&self, user_id: UserId) -> Result<RewardStats, ValuationError> {
        self.stats_as_of(user_id, Local::now()).await
    }

    pub async fn stats_as_of(
        &self,
        user_id: UserId,
        now: DateTime<Local>,
    ) -> Result<RewardStats, ValuationError> {
        let (today, portfolio_value) = futures::try_join!(
            self.today_holdings_as_of(user_id, now),
            self.portfolio_value(user_id)
        )?;
        Ok(RewardStats {
            today: sum_by_symbol(&today)?,
            portfolio_value,
        })
    }
}
