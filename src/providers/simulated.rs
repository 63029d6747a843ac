use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::core::price::{PriceFeed, PriceQuote};

/// Deterministic stand-in for a live feed. Every call for a symbol draws a
/// fresh price in `[500, 1500)` with two decimals; two feeds built with the
/// same seed produce the same sequence.
pub struct SimulatedPriceFeed {
    seed: u64,
    calls: AtomicU64,
}

// FNV-1a, stable across runs and platforms unlike the std hasher.
fn symbol_hash(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl SimulatedPriceFeed {
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random::<u64>);
        debug!(seed, "Simulated price feed ready");
        SimulatedPriceFeed {
            seed,
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PriceFeed for SimulatedPriceFeed {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch_latest(&self, symbol: &str) -> Result<Option<PriceQuote>> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut rng =
            ChaCha8Rng::seed_from_u64(self.seed ^ symbol_hash(symbol) ^ call.rotate_left(32));
        let paise: u32 = rng.gen_range(50_000..150_000);
        Ok(Some(PriceQuote {
            price: f64::from(paise) / 100.0,
            observed_at: Utc::now(),
            short_name: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn draw(feed: &SimulatedPriceFeed, symbol: &str) -> f64 {
        feed.fetch_latest(symbol).await.unwrap().unwrap().price
    }

    #[tokio::test]
    async fn test_prices_in_range_with_two_decimals() {
        let feed = SimulatedPriceFeed::new(Some(42));
        for _ in 0..200 {
            let price = draw(&feed, "RELIANCE.NS").await;
            assert!((500.0..1500.0).contains(&price), "{price}");
            let paise = price * 100.0;
            assert!((paise - paise.round()).abs() < 1e-6, "{price}");
        }
    }

    #[tokio::test]
    async fn test_same_seed_same_sequence() {
        let a = SimulatedPriceFeed::new(Some(7));
        let b = SimulatedPriceFeed::new(Some(7));
        for symbol in ["TCS.NS", "INFY.NS", "TCS.NS"] {
            assert_eq!(draw(&a, symbol).await, draw(&b, symbol).await);
        }
    }

    #[tokio::test]
    async fn test_prices_move_between_calls() {
        let feed = SimulatedPriceFeed::new(Some(7));
        let mut prices = Vec::new();
        for _ in 0..10 {
            prices.push(draw(&feed, "TCS.NS").await);
        }
        prices.dedup();
        assert!(prices.len() > 1);
    }

    #[test]
    fn test_symbol_hash_is_stable() {
        assert_eq!(symbol_hash(""), 0xcbf2_9ce4_8422_2325);
        assert_ne!(symbol_hash("TCS.NS"), symbol_hash("INFY.NS"));
    }
}
