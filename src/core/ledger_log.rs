//! Append-only ledger entry log
//!
//! The log holds one `LedgerEntry` per committed posting, in commit order.
//! It serves two purposes:
//! - Audit: every balance movement can be traced back to an entry
//! - Idempotency: postings carrying an external reference (invoice token,
//!   request id) can be looked up before crediting again. References are
//!   unique per entry type, so a transfer request id never shadows an
//!   invoice token with the same text.
//!
//! # Thread Safety
//!
//! Entries live behind an `RwLock`; the id and reference indexes are `DashMap`s
//! so lookups don't contend with each other. Appends only happen from
//! `AccountStore::commit`, which already serializes commits, and an entry is
//! pushed before its index slots are published.

use crate::types::{EntryId, EntryType, LedgerEntry, PendingEntry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<LedgerEntry>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Append-only, timestamp-ordered log of completed postings
#[derive(Debug, Default)]
pub struct LedgerLog {
    state: RwLock<LogState>,

    /// Position of each entry in `state.entries`, by id
    by_id: DashMap<EntryId, usize>,

    /// Position of each entry in `state.entries`, by entry type and external reference
    by_reference: DashMap<(EntryType, String), usize>,
}

impl LedgerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append pending entries, assigning ids and timestamps
    ///
    /// Timestamps never go backwards along the log, even if the wall clock does.
    pub(crate) fn append(&self, pending: Vec<PendingEntry>) -> Vec<LedgerEntry> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut appended = Vec::with_capacity(pending.len());

        for entry in pending {
            let now = Utc::now();
            let timestamp = match state.last_timestamp {
                Some(last) if last > now => last,
                _ => now,
            };
            state.last_timestamp = Some(timestamp);

            let entry = entry.complete(Uuid::new_v4(), timestamp);
            let position = state.entries.len();
            state.entries.push(entry.clone());

            self.by_id.insert(entry.id, position);
            if let Some(reference) = &entry.reference {
                self.by_reference
                    .insert((entry.entry_type, reference.clone()), position);
            }

            appended.push(entry);
        }

        appended
    }

    /// Number of entries in the log
    pub fn len(&self) -> usize {
        self.read(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, in commit order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.read(|entries| entries.to_vec())
    }

    /// Look up an entry by id
    pub fn get(&self, id: &EntryId) -> Option<LedgerEntry> {
        let position = *self.by_id.get(id)?;
        self.read(|entries| entries.get(position).cloned())
    }

    /// Whether a posting of this type was already committed under the reference
    pub fn contains_reference(&self, entry_type: EntryType, reference: &str) -> bool {
        self.by_reference
            .contains_key(&(entry_type, reference.to_string()))
    }

    /// Look up the entry of this type committed under an external reference
    pub fn find_by_reference(
        &self,
        entry_type: EntryType,
        reference: &str,
    ) -> Option<LedgerEntry> {
        let position = *self.by_reference.get(&(entry_type, reference.to_string()))?;
        self.read(|entries| entries.get(position).cloned())
    }

    /// Entries debiting or crediting the given company
    pub fn for_company(&self, company_id: &str) -> Vec<LedgerEntry> {
        self.read(|entries| {
            entries
                .iter()
                .filter(|entry| entry.company_id() == Some(company_id))
                .cloned()
                .collect()
        })
    }

    /// Entries crediting the given user
    pub fn for_user(&self, user_id: &str) -> Vec<LedgerEntry> {
        self.read(|entries| {
            entries
                .iter()
                .filter(|entry| entry.user_id() == Some(user_id))
                .cloned()
                .collect()
        })
    }

    fn read<T>(&self, f: impl FnOnce(&[LedgerEntry]) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state.entries)
    }
}
