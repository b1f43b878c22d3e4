//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Company and user account documents
//! - `ledger`: Ledger entries and posting results
//! - `request`: Caller identity and engine requests
//! - `error`: Error types for the points ledger

pub mod account;
pub mod error;
pub mod ledger;
pub mod request;

pub use account::{CompanyAccount, CompanyId, Points, UserAccount, UserId};
pub use error::{ErrorCode, LedgerError};
pub use ledger::{
    AccountRef, Auxiliary, EntryId, EntryStatus, EntryType, LedgerEntry, PendingEntry, Posting,
};
pub use request::{CallerIdentity, RechargeRequest, TransferRequest};
