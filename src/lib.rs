//! Points Ledger Library
//! # Overview
//!
//! This library moves recycling-reward points between company and user
//! accounts. Every movement is atomic: the debit, the credit and the
//! immutable ledger entry all commit together, or nothing does, even under
//! concurrent requests and duplicate payment callbacks.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (accounts, ledger entries, errors)
//! - [`config`] - Conversion rates, retry and replay settings, gateway credentials
//! - [`core`] - Ledger logic:
//!   - [`core::store`] - Account store with optimistic multi-document transactions
//!   - [`core::ledger_log`] - Append-only ledger entry log
//!   - [`core::engine`] - Transfer engine, the only writer of balances
//! - [`services`] - Deposit validation and recharge reconciliation
//! - [`gateway`] - Payment gateway contract, simulated and PayDunya implementations
//! - [`identity`] - Identity provider contract
//! - [`bootstrap`] - Tracing set-up and explicit construction of the services
//! - [`io`] - CSV formats and readers
//! - [`replay`] - Replay of an operations file (the CLI pipeline)
//! - [`cli`] - CLI arguments parsing
//!
//! # Postings
//!
//! The engine records two kinds of ledger entry:
//!
//! - **CREDIT_USER**: a company balance is debited and a user balance credited
//!   by the same amount; the user account is created on first credit
//! - **RECHARGE_COMPANY**: a company balance is credited from a payment the
//!   gateway has confirmed; the invoice token is the entry's reference, so a
//!   payment is credited at most once
//!
//! # Balances
//!
//! Company and user balances are non-negative integers of points and are
//! never observed negative or half-updated.

// Module declarations
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod core;
pub mod gateway;
pub mod identity;
pub mod io;
pub mod replay;
pub mod services;
pub mod types;

pub use bootstrap::{init_tracing, AppContext};
pub use config::{LedgerConfig, ReplayConfig, RetryPolicy};
pub use crate::core::{AccountStore, LedgerLog, TransferEngine};
pub use io::{write_balances_csv, write_ledger_csv};
pub use replay::{replay, ReplayInputs, ReplaySummary};
pub use services::{DepositValidationService, RechargeReconciliationService};
pub use types::{
    CallerIdentity, CompanyAccount, CompanyId, LedgerEntry, LedgerError, Points, Posting,
    UserAccount, UserId,
};
