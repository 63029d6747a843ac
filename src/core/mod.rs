//! Core ledger logic: intake, posting, pricing, valuation and refresh

pub mod config;
pub mod error;
pub mod fees;
pub mod idempotency;
pub mod intake;
pub mod log;
pub mod model;
pub mod oracle;
pub mod posting;
pub mod price;
pub mod refresh;
pub mod store;
pub mod users;
pub mod valuation;

// Re-export main types for cleaner imports
pub use error::{PostingError, StoreError, UpstreamError, ValidationError, ValuationError};
pub use posting::{PostingEngine, PostingOutcome};
pub use price::{PriceFeed, PriceQuote};
pub use store::{LedgerStore, Transaction, WriteSet};
pub use valuation::ValuationEngine;
