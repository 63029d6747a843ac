//! Latest-price queries over the stored time series, plus fetching fresh
//! observations from the configured feed.

use crate::core::error::{StoreError, UpstreamError};
use crate::core::model::StockPrice;
use crate::core::price::{PriceFeed, PriceQuote};
use crate::core::store::LedgerStore;
use rust_decimal::{Decimal, prelude::*};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);
const PRICE_DECIMALS: u32 = 4;

/// Rejects NaN, infinities and negative prices before they reach the ledger.
pub fn validate_quote(symbol: &str, quote: &PriceQuote) -> Result<Decimal, UpstreamError> {
    let invalid = || UpstreamError::InvalidPrice {
        symbol: symbol.to_string(),
        price: quote.price,
    };
    if !quote.price.is_finite() || quote.price < 0.0 {
        return Err(invalid());
    }
    Decimal::from_f64(quote.price)
        .map(|p| p.round_dp(PRICE_DECIMALS).normalize())
        .ok_or_else(invalid)
}

pub struct PriceOracle {
    store: Arc<dyn LedgerStore>,
    feed: Arc<dyn PriceFeed>,
    fetch_timeout: Duration,
}

impl PriceOracle {
    pub fn new(store: Arc<dyn LedgerStore>, feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            store,
            feed,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn feed_name(&self) -> &str {
        self.feed.name()
    }

    pub async fn latest(&self, symbol: &str) -> Result<Option<Decimal>, StoreError> {
        Ok(self.store.latest_price(symbol).await?.map(|p| p.price))
    }

    /// Fetches one quote and appends it to the series. Exactly one feed call is made.
    #[instrument(name = "PriceObserve", skip(self), fields(feed = %self.feed.name()))]
    pub async fn observe(&self, symbol: &str) -> Result<StockPrice, UpstreamError> {
        let quote = tokio::time::timeout(self.fetch_timeout, self.feed.fetch_latest(symbol))
            .await
            .map_err(|_| UpstreamError::Timeout(symbol.to_string()))?
            .map_err(|e| UpstreamError::Feed {
                symbol: symbol.to_string(),
                message: format!("{e:#}"),
            })?
            .ok_or_else(|| UpstreamError::NoQuote(symbol.to_string()))?;

        let price = validate_quote(symbol, &quote)?;
        let observation = StockPrice {
            stock_symbol: symbol.to_string(),
            price,
            observed_at: quote.observed_at,
            source: self.feed.name().to_string(),
        };
        self.store.append_price(observation.clone()).await?;
        debug!(%price, "Recorded price observation");
        Ok(observation)
    }
}
