use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::price::{PriceFeed, PriceQuote};
use crate::providers::util::with_retry;

const DEFAULT_RETRIES: usize = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Latest quotes from the Yahoo Finance chart endpoint.
pub struct YahooPriceFeed {
    base_url: String,
    client: reqwest::Client,
    retries: usize,
    retry_delay_ms: u64,
}

impl YahooPriceFeed {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rewardledger/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(YahooPriceFeed {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        })
    }

    pub fn with_retries(mut self, retries: usize, delay_ms: u64) -> Self {
        self.retries = retries;
        self.retry_delay_ms = delay_ms;
        self
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
    short_name: Option<String>,
}

#[async_trait]
impl PriceFeed for YahooPriceFeed {
    fn name(&self) -> &str {
        "yahoo"
    }

    #[instrument(name = "YahooPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_latest(&self, symbol: &str) -> Result<Option<PriceQuote>> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d",
            self.base_url, symbol
        );
        debug!("Requesting price data from {}", url);

        let response = with_retry(
            || async { self.client.get(&url).send().await },
            self.retries,
            self.retry_delay_ms,
        )
        .await
        .map_err(|e| anyhow!("Request error: {} for symbol: {} URL: {}", e, symbol, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let data = response
            .json::<YahooChartResponse>()
            .await
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        let Some(meta) = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .map(|item| item.meta)
        else {
            debug!("No chart data returned");
            return Ok(None);
        };
        let Some(price) = meta.regular_market_price else {
            debug!("Chart data carries no market price");
            return Ok(None);
        };

        let observed_at = meta
            .regular_market_time
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .unwrap_or_else(Utc::now);
        Ok(Some(PriceQuote {
            price,
            observed_at,
            short_name: meta.short_name,
        }))
    }
}
