//! Price feed abstraction and quote type

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observation as reported by a feed. Untrusted until validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
    pub short_name: Option<String>,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Label recorded as the `source` of stored observations.
    fn name(&self) -> &str;

    /// `Ok(None)` when the feed knows no price for the symbol.
    async fn fetch_latest(&self, symbol: &str) -> Result<Option<PriceQuote>>;
}
