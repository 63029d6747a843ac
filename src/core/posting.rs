//! Turns one reward request into a Reward row plus a balanced batch of ledger
//! entries, committed atomically and at most once per idempotency key.

use crate::core::error::{PostingError, StoreError};
use crate::core::fees::{FeeBreakdown, FeeSchedule};
use crate::core::idempotency::{self, Guard};
use crate::core::intake::{self, NormalizedReward, RawRewardRequest};
use crate::core::log;
use crate::core::model::{
    Account, Currency, EntryMeta, EntryType, LedgerEntry, Reward, RewardId, Stock,
};
use crate::core::oracle::PriceOracle;
use crate::core::store::{LedgerStore, Transaction};
use crate::core::users::UserDirectory;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingOutcome {
    Recorded { reward_id: RewardId },
    /// The idempotency key was already used; carries the original reward.
    Duplicate { reward_id: RewardId },
}

impl PostingOutcome {
    pub fn reward_id(&self) -> RewardId {
        match self {
            PostingOutcome::Recorded { reward_id } | PostingOutcome::Duplicate { reward_id } => {
                *reward_id
            }
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            PostingOutcome::Recorded { .. } => "recorded",
            PostingOutcome::Duplicate { .. } => "duplicate_idempotency",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            PostingOutcome::Recorded { .. } => 201,
            PostingOutcome::Duplicate { .. } => 409,
        }
    }
}

/// Builds the six rows for one reward: a unit group and a cash group.
pub fn build_entries(
    reward: &Reward,
    price: Decimal,
    gross_value: Decimal,
    fees: &FeeBreakdown,
    now: DateTime<Utc>,
) -> Vec<LedgerEntry> {
    let entry = |account: Account,
                 entry_type: EntryType,
                 amount: Decimal,
                 currency: Currency,
                 meta: EntryMeta| {
        let unit_row = currency == Currency::Unit;
        LedgerEntry {
            id: Uuid::new_v4(),
            reward_id: reward.id,
            user_id: (account == Account::UserStock).then_some(reward.user_id),
            account,
            symbol: unit_row.then(|| reward.stock_symbol.clone()),
            amount,
            currency,
            entry_type,
            meta,
            created_at: now,
        }
    };
    let allocation = || EntryMeta::Allocation {
        price,
        extra: BTreeMap::new(),
    };
    let fee_meta = || EntryMeta::Fees {
        brokerage: fees.brokerage,
        stt: fees.stt,
        gst: fees.gst,
        extra: BTreeMap::new(),
    };

    vec![
        entry(
            Account::UserStock,
            EntryType::Debit,
            reward.quantity,
            Currency::Unit,
            EntryMeta::note("user received stock units"),
        ),
        entry(
            Account::StockPool,
            EntryType::Credit,
            reward.quantity,
            Currency::Unit,
            EntryMeta::note("stock pool reduced"),
        ),
        entry(
            Account::ExpenseStockAllocation,
            EntryType::Debit,
            gross_value,
            Currency::Inr,
            allocation(),
        ),
        entry(
            Account::Cash,
            EntryType::Credit,
            gross_value,
            Currency::Inr,
            allocation(),
        ),
        entry(
            Account::ExpenseFees,
            EntryType::Debit,
            fees.total,
            Currency::Inr,
            fee_meta(),
        ),
        entry(
            Account::Cash,
            EntryType::Credit,
            fees.total,
            Currency::Inr,
            fee_meta(),
        ),
    ]
}

/// Checks that debits equal credits within every currency of the batch.
/// A currency whose totals overflow is reported as unbalanced.
pub fn verify_balance(entries: &[LedgerEntry]) -> Result<(), Currency> {
    let mut totals: BTreeMap<Currency, (Decimal, Decimal)> = BTreeMap::new();
    for entry in entries {
        let (debit, credit) = totals.entry(entry.currency).or_default();
        let side = match entry.entry_type {
            EntryType::Debit => debit,
            EntryType::Credit => credit,
        };
        *side = side.checked_add(entry.amount).ok_or(entry.currency)?;
    }
    match totals.into_iter().find(|(_, (debit, credit))| debit != credit) {
        Some((currency, _)) => Err(currency),
        None => Ok(()),
    }
}

pub struct PostingEngine {
    store: Arc<dyn LedgerStore>,
    users: Arc<dyn UserDirectory>,
    oracle: Arc<PriceOracle>,
    fees: FeeSchedule,
}

impl PostingEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        users: Arc<dyn UserDirectory>,
        oracle: Arc<PriceOracle>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            store,
            users,
            oracle,
            fees,
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Validates a raw request and posts it.
    pub async fn post_reward(&self, raw: RawRewardRequest) -> Result<PostingOutcome, PostingError> {
        let request = intake::validate(&raw).inspect_err(|e| {
            warn!(errors = ?e.messages, "Reward request failed validation");
        })?;
        self.post_normalized(request).await
    }

    pub async fn post_normalized(
        &self,
        request: NormalizedReward,
    ) -> Result<PostingOutcome, PostingError> {
        let trace_id = log::new_trace_id();
        let span = info_span!("post_reward", %trace_id, symbol = %request.stock_symbol);
        self.post_in_span(request)
            .instrument(span.clone())
            .await
            .inspect_err(|e| {
                // Callers only see "internal error"; the detail stays in the log.
                if e.status_code() == 500 {
                    span.in_scope(|| error!(error = ?e, "Reward posting failed"));
                }
            })
    }

    async fn post_in_span(
        &self,
        request: NormalizedReward,
    ) -> Result<PostingOutcome, PostingError> {
        info!("Incoming reward request");
        let user_id = request.user_uuid().inspect_err(|_| {
            warn!(user_id = %request.user_id, "Invalid user id format");
        })?;

        if !self
            .users
            .exists(user_id)
            .await
            .map_err(PostingError::Internal)?
        {
            warn!(%user_id, "User not found");
            return Err(PostingError::UserNotFound(user_id));
        }

        let symbol = request.stock_symbol.as_str();
        match self.store.stock(symbol).await? {
            Some(stock) if !stock.active => {
                warn!("Stock inactive");
                return Err(PostingError::StockUnavailable(symbol.to_string()));
            }
            Some(_) => {}
            // Seeded outside the transaction so a slow feed never holds it open;
            // the observation stays even if the posting below rolls back.
            None => match self.oracle.observe(symbol).await {
                Ok(seeded) => info!(price = %seeded.price, "Seeded price for new stock"),
                Err(e) => warn!(error = %e, "Failed to seed price for new stock, continuing"),
            },
        }

        let mut tx = Transaction::begin(self.store.as_ref());

        match tx.stock(symbol).await? {
            None => {
                info!("Stock missing, creating minimal record");
                tx.stage_stock(Stock::new_active(symbol));
            }
            Some(stock) if !stock.active => {
                tx.rollback();
                warn!("Stock inactive");
                return Err(PostingError::StockUnavailable(symbol.to_string()));
            }
            Some(_) => {}
        }

        let key = request.idempotency_key.as_deref();
        if let Guard::Duplicate(reward_id) = idempotency::check(&tx, key).await? {
            tx.rollback();
            info!(%reward_id, "Duplicate idempotency key");
            return Ok(PostingOutcome::Duplicate { reward_id });
        }

        let now = Utc::now();
        let reward = Reward {
            id: Uuid::new_v4(),
            user_id,
            stock_symbol: request.stock_symbol.clone(),
            quantity: request.quantity,
            rewarded_at: request.rewarded_at,
            source: request.source.clone(),
            idempotency_key: request.idempotency_key.clone(),
            created_at: now,
        };
        tx.stage_reward(reward.clone());

        let price = tx
            .latest_price(symbol)
            .await?
            .map_or(Decimal::ZERO, |p| p.price);
        let Some((gross_value, fees)) = reward.quantity.checked_mul(price).and_then(|gross| {
            let fees = self.fees.compute(gross)?;
            gross.checked_add(fees.total).map(|_| (gross, fees))
        }) else {
            tx.rollback();
            return Err(PostingError::Overflow(symbol.to_string()));
        };
        debug!(%price, %gross_value, total_fees = %fees.total, "Computed allocation");

        let entries = build_entries(&reward, price, gross_value, &fees, now);
        if let Err(currency) = verify_balance(&entries) {
            tx.rollback();
            return Err(PostingError::Unbalanced(currency));
        }
        tx.stage_entries(entries);

        match tx.commit().await {
            Ok(()) => {
                info!(reward_id = %reward.id, "Reward and ledger committed");
                Ok(PostingOutcome::Recorded {
                    reward_id: reward.id,
                })
            }
            Err(StoreError::UniqueViolation(key)) => {
                let reward_id = idempotency::resolve_conflict(self.store.as_ref(), &key).await?;
                info!(%reward_id, "Lost idempotency race, returning existing reward");
                Ok(PostingOutcome::Duplicate { reward_id })
            }
            Err(e) => Err(PostingError::Storage(e)),
        }
    }

    pub async fn ledger_for_reward(
        &self,
        reward_id: RewardId,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.store.ledger_for_reward(reward_id).await
    }
}
