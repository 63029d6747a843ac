pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::intake::RawRewardRequest;
use crate::core::oracle::PriceOracle;
use crate::core::posting::PostingEngine;
use crate::core::price::PriceFeed;
use crate::core::refresh::PriceRefresher;
use crate::core::store::LedgerStore;
use crate::core::users::StaticUserDirectory;
use crate::core::valuation::ValuationEngine;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub use crate::core::config;

pub enum AppCommand {
    Reward(RawRewardRequest),
    Portfolio { user_id: String },
    Today { user_id: String },
    History { user_id: String },
    Stats { user_id: String },
    Ledger { reward_id: String },
    Refresh,
    Watch,
}

/// Engines wired over one store and one price feed.
pub struct App {
    pub store: Arc<dyn LedgerStore>,
    pub posting: PostingEngine,
    pub valuation: ValuationEngine,
    pub refresher: Arc<PriceRefresher>,
}

impl App {
    /// Opens the persistent store and the configured feed.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = store::open_store(config)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: &AppConfig, store: Arc<dyn LedgerStore>) -> Result<Self> {
        let feed = providers::feed_from_config(config)?;
        Ok(Self::with_parts(config, store, feed))
    }

    pub fn with_parts(
        config: &AppConfig,
        store: Arc<dyn LedgerStore>,
        feed: Arc<dyn PriceFeed>,
    ) -> Self {
        let oracle = Arc::new(PriceOracle::new(Arc::clone(&store), feed));
        let users = Arc::new(StaticUserDirectory::new(config.users.iter().copied()));
        debug!(
            users = config.users.len(),
            feed = %oracle.feed_name(),
            "Wiring ledger engines"
        );

        App {
            posting: PostingEngine::new(
                Arc::clone(&store),
                users,
                Arc::clone(&oracle),
                config.fees.clone(),
            ),
            valuation: ValuationEngine::new(Arc::clone(&store)),
            refresher: Arc::new(PriceRefresher::new(
                Arc::clone(&store),
                oracle,
                config.refresh.clone(),
            )),
            store,
        }
    }

    pub async fn execute(&self, command: AppCommand) -> Result<()> {
        match command {
            AppCommand::Reward(request) => cli::reward::run(&self.posting, request).await,
            AppCommand::Portfolio { user_id } => {
                cli::views::portfolio(&self.valuation, cli::views::parse_user_id(&user_id)?).await
            }
            AppCommand::Today { user_id } => {
                cli::views::today(&self.valuation, cli::views::parse_user_id(&user_id)?).await
            }
            AppCommand::History { user_id } => {
                cli::views::history(&self.valuation, cli::views::parse_user_id(&user_id)?).await
            }
            AppCommand::Stats { user_id } => {
                cli::views::stats(&self.valuation, cli::views::parse_user_id(&user_id)?).await
            }
            AppCommand::Ledger { reward_id } => {
                let reward_id = cli::views::parse_reward_id(&reward_id)?;
                let entries = self.posting.ledger_for_reward(reward_id).await?;
                println!("{}", cli::views::render_ledger(reward_id, &entries));
                Ok(())
            }
            AppCommand::Refresh => cli::refresh::run_once(&self.refresher).await.map(|_| ()),
            AppCommand::Watch => cli::refresh::watch(Arc::clone(&self.refresher)).await,
        }
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Reward ledger starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    App::from_config(&config)?.execute(command).await
}
