pub mod disk;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::store::LedgerStore;
use anyhow::{Context, Result};
use disk::DiskStore;
use std::sync::Arc;
use tracing::debug;

pub use memory::MemoryStore;

/// Opens the persistent ledger store under the configured data path.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn LedgerStore>> {
    let path = config.default_data_path()?;
    debug!("Opening ledger store at {}", path.display());
    let store = DiskStore::open(&path)
        .with_context(|| format!("Failed to open ledger store at {}", path.display()))?;
    Ok(Arc::new(store))
}
