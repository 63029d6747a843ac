pub mod simulated;
pub mod util;
pub mod yahoo_finance;

use crate::core::config::{AppConfig, PriceSource};
use crate::core::price::PriceFeed;
use anyhow::Result;
use std::sync::Arc;

pub use simulated::SimulatedPriceFeed;
pub use yahoo_finance::YahooPriceFeed;

/// Builds the feed selected by `price_source`.
pub fn feed_from_config(config: &AppConfig) -> Result<Arc<dyn PriceFeed>> {
    Ok(match config.price_source {
        PriceSource::Yahoo => Arc::new(YahooPriceFeed::new(&config.providers.yahoo.base_url)?),
        PriceSource::Simulated => {
            Arc::new(SimulatedPriceFeed::new(config.providers.simulated.seed))
        }
    })
}
