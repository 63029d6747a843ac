//! Periodic price refresh for every active stock.
//!
//! One cycle runs immediately, then one per interval until the shutdown channel
//! fires. Shutdown is only observed between cycles, so a cycle that has started
//! always finishes. Once `failure_threshold` consecutive cycles have failed for
//! every symbol, the wait before the next cycle grows exponentially (with jitter)
//! up to `max_backoff`.

use crate::core::config::RefreshSettings;
use crate::core::error::StoreError;
use crate::core::oracle::PriceOracle;
use crate::core::store::LedgerStore;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Largest doubling applied to the interval; keeps the multiplication finite.
const MAX_BACKOFF_DOUBLINGS: u32 = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub fetched: usize,
    pub failed: usize,
}

impl RefreshReport {
    pub fn all_failed(&self) -> bool {
        self.fetched == 0 && self.failed > 0
    }
}

/// Called before each symbol is fetched with `(position, total, symbol)`.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, &str) + Send + Sync);

/// Wait before the next cycle given how many cycles in a row failed completely.
pub fn next_wait(
    settings: &RefreshSettings,
    consecutive_failures: u32,
    rng: &mut impl Rng,
) -> Duration {
    let interval = settings.interval();
    if consecutive_failures < settings.failure_threshold.max(1) {
        return interval;
    }

    let doublings = (consecutive_failures + 1 - settings.failure_threshold.max(1))
        .min(MAX_BACKOFF_DOUBLINGS);
    let base = interval.saturating_mul(1 << doublings);
    let jitter_ms = rng.gen_range(0..=(base.as_millis() / 10).min(u64::MAX as u128) as u64);
    let wait = base.saturating_add(Duration::from_millis(jitter_ms));

    wait.min(settings.max_backoff()).max(interval)
}

pub struct PriceRefresher {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<PriceOracle>,
    settings: RefreshSettings,
}

impl PriceRefresher {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        oracle: Arc<PriceOracle>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            store,
            oracle,
            settings,
        }
    }

    pub async fn run_cycle(&self) -> Result<RefreshReport, StoreError> {
        self.run_cycle_with(&|_, _, _| {}).await
    }

    /// Fetches one price per active stock, pausing between fetches. A failed
    /// symbol is logged and skipped.
    pub async fn run_cycle_with(
        &self,
        progress: ProgressFn<'_>,
    ) -> Result<RefreshReport, StoreError> {
        let stocks = self.store.active_stocks().await?;
        let total = stocks.len();
        debug!(total, feed = %self.oracle.feed_name(), "Starting price refresh cycle");

        let mut report = RefreshReport::default();
        for (position, stock) in stocks.iter().enumerate() {
            if position > 0 {
                tokio::time::sleep(self.settings.pacing()).await;
            }
            progress(position, total, &stock.symbol);

            match self.oracle.observe(&stock.symbol).await {
                Ok(observation) => {
                    debug!(symbol = %stock.symbol, price = %observation.price, "Refreshed price");
                    report.fetched += 1;
                }
                Err(e) => {
                    warn!(symbol = %stock.symbol, error = %e, "Price refresh failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            fetched = report.fetched,
            failed = report.failed,
            "Price refresh cycle complete"
        );
        Ok(report)
    }

    /// Runs until `shutdown` receives a value or its sender is dropped.
    /// Returns the number of cycles executed.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> usize {
        info!(
            interval_secs = self.settings.interval_secs,
            "Price refresher started"
        );
        let mut cycles = 0;
        let mut consecutive_failures = 0u32;

        loop {
            match self.run_cycle().await {
                Ok(report) if report.all_failed() => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
                Ok(_) => consecutive_failures = 0,
                Err(e) => {
                    error!(error = %e, "Could not list stocks for price refresh");
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
            }
            cycles += 1;

            let wait = next_wait(&self.settings, consecutive_failures, &mut rand::thread_rng());
            if consecutive_failures >= self.settings.failure_threshold {
                warn!(
                    consecutive_failures,
                    wait_secs = wait.as_secs(),
                    "Price refresh keeps failing, backing off"
                );
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!(cycles, "Price refresher stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Stock;
    use crate::core::price::{PriceFeed, PriceQuote};
    use crate::store::MemoryStore;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Mutex;

    /// Fails for symbols starting with "BAD", records every call.
    #[derive(Default)]
    struct PickyFeed {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PriceFeed for PickyFeed {
        fn name(&self) -> &str {
            "picky"
        }

        async fn fetch_latest(&self, symbol: &str) -> Result<Option<PriceQuote>> {
            self.calls.lock().unwrap().push(symbol.to_string());
            if symbol.starts_with("BAD") {
                return Err(anyhow!("upstream unavailable"));
            }
            Ok(Some(PriceQuote {
                price: 1000.0,
                observed_at: Utc::now(),
                short_name: None,
            }))
        }
    }

    fn settings(interval_secs: u64) -> RefreshSettings {
        RefreshSettings {
            interval_secs,
            pacing_ms: 100,
            max_backoff_secs: interval_secs * 10,
            failure_threshold: 2,
        }
    }

    async fn refresher(
        symbols: &[&str],
        settings: RefreshSettings,
    ) -> (PriceRefresher, Arc<MemoryStore>, Arc<PickyFeed>) {
        let store = Arc::new(MemoryStore::new());
        for symbol in symbols {
            store.put_stock(Stock::new_active(symbol)).await;
        }
        let mut inactive = Stock::new_active("OLD.NS");
        inactive.active = false;
        store.put_stock(inactive).await;

        let feed = Arc::new(PickyFeed::default());
        let oracle = Arc::new(PriceOracle::new(store.clone(), feed.clone()));
        (
            PriceRefresher::new(store.clone(), oracle, settings),
            store,
            feed,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_skips_failures_and_inactive_stocks() {
        let (refresher, store, feed) =
            refresher(&["BAD.NS", "INFY.NS", "TCS.NS"], settings(60)).await;

        let seen = Mutex::new(Vec::new());
        let report = refresher
            .run_cycle_with(&|position, total, symbol| {
                seen.lock().unwrap().push((position, total, symbol.to_string()));
            })
            .await
            .unwrap();

        assert_eq!(report, RefreshReport { fetched: 2, failed: 1 });
        assert!(!report.all_failed());
        assert_eq!(store.row_counts().await.unwrap().prices, 2);
        assert!(!feed.calls.lock().unwrap().contains(&"OLD.NS".to_string()));
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(seen.lock().unwrap()[2], (2, 3, "TCS.NS".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_paces_between_fetches() {
        let (refresher, _, _) = refresher(&["A.NS", "B.NS", "C.NS"], settings(60)).await;
        let started = tokio::time::Instant::now();
        refresher.run_cycle().await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (refresher, store, _) = refresher(&["INFY.NS"], settings(3600)).await;
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move { refresher.run(rx).await });
        tokio::time::sleep(Duration::from_secs(3600 * 2 + 1800)).await;
        tx.send(()).unwrap();

        let cycles = handle.await.unwrap();
        assert_eq!(cycles, 3);
        assert_eq!(store.row_counts().await.unwrap().prices, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_finishes_when_sender_dropped() {
        let (refresher, _, _) = refresher(&[], settings(3600)).await;
        let (tx, rx) = broadcast::channel::<()>(1);
        drop(tx);
        assert_eq!(refresher.run(rx).await, 1);
    }

    #[test]
    fn test_next_wait_backs_off_after_threshold() {
        let settings = settings(60);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(next_wait(&settings, 0, &mut rng), Duration::from_secs(60));
        assert_eq!(next_wait(&settings, 1, &mut rng), Duration::from_secs(60));

        let first = next_wait(&settings, 2, &mut rng);
        assert!(first >= Duration::from_secs(120), "{first:?}");
        assert!(first <= Duration::from_secs(132), "{first:?}");

        let second = next_wait(&settings, 3, &mut rng);
        assert!(second >= Duration::from_secs(240), "{second:?}");

        assert_eq!(next_wait(&settings, 40, &mut rng), Duration::from_secs(600));
    }
}
