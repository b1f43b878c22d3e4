//! Ledger entry types
//!
//! A ledger entry is the immutable audit record of one completed posting.
//! Entries are only ever written by a committed store transaction, so a
//! rejected or aborted attempt leaves no trace in the log.

use super::account::{CompanyId, Points, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ledger entry identifier (generated at append time)
pub type EntryId = Uuid;

/// Kinds of posting recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Company balance debited, user balance credited by the same amount
    CreditUser,

    /// Company balance credited from externally verified funds
    RechargeCompany,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::CreditUser => write!(f, "CREDIT_USER"),
            EntryType::RechargeCompany => write!(f, "RECHARGE_COMPANY"),
        }
    }
}

/// Entry status. Only completed postings are ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Completed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// One side of a posting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AccountRef {
    Company(CompanyId),
    User(UserId),
    /// Funds entering the ledger from outside, named by their provider
    External(String),
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Company(id) => write!(f, "company:{}", id),
            AccountRef::User(id) => write!(f, "user:{}", id),
            AccountRef::External(source) => write!(f, "external:{}", source),
        }
    }
}

/// Context recorded alongside a posting
///
/// The engine stores this verbatim and never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Auxiliary {
    /// A validated physical deposit
    Deposit { weight_kg: Decimal, agent_id: String },

    /// A verified external payment
    Recharge {
        amount_paid: Decimal,
        provider: String,
    },

    None,
}

impl fmt::Display for Auxiliary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auxiliary::Deposit {
                weight_kg,
                agent_id,
            } => write!(f, "weight_kg={} agent={}", weight_kg, agent_id),
            Auxiliary::Recharge {
                amount_paid,
                provider,
            } => write!(f, "amount_paid={} provider={}", amount_paid, provider),
            Auxiliary::None => Ok(()),
        }
    }
}

/// Immutable record of one completed posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub entry_type: EntryType,
    pub source: AccountRef,
    pub destination: AccountRef,

    /// Points moved (always positive)
    pub amount: Points,
    pub auxiliary: Auxiliary,

    /// External idempotency key
    ///
    /// The gateway invoice token for recharges, or a caller-supplied request id
    /// for transfers. Unique across the log.
    pub reference: Option<String>,
    pub status: EntryStatus,

    /// Server-assigned commit time, never decreasing along the log
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// Company referenced by this entry (every entry references exactly one)
    pub fn company_id(&self) -> Option<&str> {
        [&self.source, &self.destination]
            .into_iter()
            .find_map(|side| match side {
                AccountRef::Company(id) => Some(id.as_str()),
                _ => None,
            })
    }

    /// User referenced by this entry, if any
    pub fn user_id(&self) -> Option<&str> {
        [&self.source, &self.destination]
            .into_iter()
            .find_map(|side| match side {
                AccountRef::User(id) => Some(id.as_str()),
                _ => None,
            })
    }
}

/// A ledger entry buffered inside an open transaction
///
/// It receives its id and timestamp only when the transaction commits.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub entry_type: EntryType,
    pub source: AccountRef,
    pub destination: AccountRef,
    pub amount: Points,
    pub auxiliary: Auxiliary,
    pub reference: Option<String>,
}

impl PendingEntry {
    /// Seal the pending entry into a completed ledger entry
    pub fn complete(self, id: EntryId, timestamp: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            entry_type: self.entry_type,
            source: self.source,
            destination: self.destination,
            amount: self.amount,
            auxiliary: self.auxiliary,
            reference: self.reference,
            status: EntryStatus::Completed,
            timestamp,
        }
    }
}

/// Result of an engine operation
///
/// `Replayed` means a posting with the same reference was already in the log;
/// the stored entry is returned and no balance moved.
#[derive(Debug, Clone, PartialEq)]
pub enum Posting {
    Applied(LedgerEntry),
    Replayed(LedgerEntry),
}

impl Posting {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Posting::Applied(entry) | Posting::Replayed(entry) => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            Posting::Applied(entry) | Posting::Replayed(entry) => entry,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Posting::Replayed(_))
    }
}
