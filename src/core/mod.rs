//! Core business logic module
//!
//! This module contains the ledger components:
//! - `store` - Transactional account store (optimistic, retry on conflict)
//! - `ledger_log` - Append-only log of completed postings
//! - `engine` - Transfer engine, the only writer of balances

pub mod engine;
pub mod ledger_log;
pub mod store;

pub use engine::TransferEngine;
pub use ledger_log::LedgerLog;
pub use store::{AccountStore, Committed, DocKey, StoreSnapshot, Transaction};
