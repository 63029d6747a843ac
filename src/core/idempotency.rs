//! Replay detection for reward postings carrying an idempotency key.

use crate::core::error::StoreError;
use crate::core::model::RewardId;
use crate::core::store::{LedgerStore, Transaction};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Proceed,
    Duplicate(RewardId),
}

/// Looks the key up inside the active transaction. No key, no check.
pub async fn check(tx: &Transaction<'_>, key: Option<&str>) -> Result<Guard, StoreError> {
    let Some(key) = key else {
        return Ok(Guard::Proceed);
    };
    match tx.reward_by_key(key).await? {
        Some(existing) => {
            debug!(key, reward_id = %existing.id, "Idempotency key already recorded");
            Ok(Guard::Duplicate(existing.id))
        }
        None => Ok(Guard::Proceed),
    }
}

/// Called after a commit lost a uniqueness race: the winner's row now exists.
pub async fn resolve_conflict(store: &dyn LedgerStore, key: &str) -> Result<RewardId, StoreError> {
    match store.reward_by_key(key).await? {
        Some(existing) => Ok(existing.id),
        None => {
            warn!(key, "Uniqueness violation reported but no reward holds the key");
            Err(StoreError::Backend(format!(
                "idempotency key {key} conflicted but no reward holds it"
            )))
        }
    }
}
