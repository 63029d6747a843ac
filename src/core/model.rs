//! Rows of the reward ledger and their vocabulary types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use uuid::Uuid;

pub type UserId = Uuid;
pub type RewardId = Uuid;

/// Source recorded on a reward when the request does not name one.
pub const DEFAULT_REWARD_SOURCE: &str = "admin_ui";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Account {
    UserStock,
    StockPool,
    Cash,
    ExpenseStockAllocation,
    ExpenseFees,
}

impl Account {
    pub fn as_str(&self) -> &'static str {
        match self {
            Account::UserStock => "USER_STOCK",
            Account::StockPool => "STOCK_POOL",
            Account::Cash => "CASH",
            Account::ExpenseStockAllocation => "EXPENSE_STOCK_ALLOCATION",
            Account::ExpenseFees => "EXPENSE_FEES",
        }
    }
}

impl Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Currency {
    Unit,
    Inr,
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Currency::Unit => "UNIT",
            Currency::Inr => "INR",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        })
    }
}

/// Scalar values allowed in the open annotation map of a ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Structured annotation attached to a ledger row, one shape per posting role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryMeta {
    /// Stock units moving between the pool and a user.
    UnitTransfer {
        note: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, MetaValue>,
    },
    /// Cash allocated to buy the rewarded units at `price`.
    Allocation {
        price: Decimal,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, MetaValue>,
    },
    /// Statutory and brokerage charges on the allocation.
    Fees {
        brokerage: Decimal,
        stt: Decimal,
        gst: Decimal,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        extra: BTreeMap<String, MetaValue>,
    },
}

impl EntryMeta {
    pub fn note(note: &str) -> Self {
        EntryMeta::UnitTransfer {
            note: note.to_string(),
            extra: BTreeMap::new(),
        }
    }

    pub fn extra(&self) -> &BTreeMap<String, MetaValue> {
        match self {
            EntryMeta::UnitTransfer { extra, .. }
            | EntryMeta::Allocation { extra, .. }
            | EntryMeta::Fees { extra, .. } => extra,
        }
    }

    pub fn with_extra(mut self, key: &str, value: MetaValue) -> Self {
        match &mut self {
            EntryMeta::UnitTransfer { extra, .. }
            | EntryMeta::Allocation { extra, .. }
            | EntryMeta::Fees { extra, .. } => {
                extra.insert(key.to_string(), value);
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub symbol: String,
    pub display_name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Stock {
    /// Minimal active stock row, named after its symbol.
    pub fn new_active(symbol: &str) -> Self {
        Stock {
            symbol: symbol.to_string(),
            display_name: symbol.to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: RewardId,
    pub user_id: UserId,
    pub stock_symbol: String,
    pub quantity: Decimal,
    pub rewarded_at: DateTime<Utc>,
    pub source: String,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub reward_id: RewardId,
    pub user_id: Option<UserId>,
    pub account: Account,
    pub symbol: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub meta: EntryMeta,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPrice {
    pub stock_symbol: String,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_serializes_to_fixed_tags() {
        assert_eq!(
            serde_json::to_string(&Account::ExpenseStockAllocation).unwrap(),
            "\"EXPENSE_STOCK_ALLOCATION\""
        );
        assert_eq!(serde_json::to_string(&Account::UserStock).unwrap(), "\"USER_STOCK\"");
        assert_eq!(serde_json::to_string(&Currency::Inr).unwrap(), "\"INR\"");
        assert_eq!(serde_json::to_string(&Currency::Unit).unwrap(), "\"UNIT\"");
        assert_eq!(serde_json::to_string(&EntryType::Credit).unwrap(), "\"CREDIT\"");
        assert_eq!(Account::ExpenseFees.to_string(), "EXPENSE_FEES");
    }

    #[test]
    fn test_entry_meta_keeps_open_extension_map() {
        let meta = EntryMeta::note("user received stock units")
            .with_extra("campaign", MetaValue::Text("diwali".to_string()))
            .with_extra("tier", MetaValue::Int(2));

        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"kind\":\"unit_transfer\""));

        let back: EntryMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
        assert_eq!(
            back.extra().get("campaign"),
            Some(&MetaValue::Text("diwali".to_string()))
        );
    }
}
