//! Transactional account store
//!
//! This module provides the `AccountStore`, which holds company and user
//! accounts plus the ledger entry log, and the `Transaction` type through
//! which every balance mutation goes.
//!
//! # Design
//!
//! Documents are kept in `DashMap`s together with a version counter. A
//! transaction is optimistic:
//!
//! ```text
//! begin ──► reads (record observed versions) ──► buffered writes ──► commit
//!                                                                     │
//!                     commit lock ◄───────────────────────────────────┘
//!                     validate read versions ── mismatch ──► Conflict (nothing applied)
//!                     apply writes, append ledger entries
//! ```
//!
//! `run_transaction` wraps this in a retry loop with exponential backoff, so
//! concurrent writers to the same company serialize without lost updates and
//! the engine above holds no locks of its own.
//!
//! # Visibility
//!
//! Single-document reads (`company`, `user`) always see a whole document.
//! Reads spanning several documents must go through `snapshot()` (or a
//! transaction) to be sure they never observe a half-applied commit.

use crate::config::RetryPolicy;
use crate::core::ledger_log::LedgerLog;
use crate::types::{
    CompanyAccount, CompanyId, EntryType, LedgerEntry, LedgerError, PendingEntry, Points,
    UserAccount, UserId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Key of anything a transaction can read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocKey {
    Company(CompanyId),
    User(UserId),
    /// Presence of an external reference among entries of one type
    Reference(EntryType, String),
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKey::Company(id) => write!(f, "company:{}", id),
            DocKey::User(id) => write!(f, "user:{}", id),
            DocKey::Reference(entry_type, reference) => {
                write!(f, "reference:{}:{}", entry_type, reference)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    value: T,
}

/// Outcome of a committed transaction
#[derive(Debug, Clone)]
pub struct Committed<T> {
    /// Value returned by the transaction body
    pub value: T,
    /// Ledger entries appended by the commit, in order
    pub entries: Vec<LedgerEntry>,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

/// Consistent view of every account at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub companies: Vec<CompanyAccount>,
    pub users: Vec<UserAccount>,
    pub ledger_len: usize,
}

impl StoreSnapshot {
    /// Sum of every company and user balance
    pub fn total_points(&self) -> u128 {
        let companies: u128 = self
            .companies
            .iter()
            .map(|c| u128::from(c.current_points))
            .sum();
        let users: u128 = self.users.iter().map(|u| u128::from(u.points)).sum();
        companies + users
    }
}

/// Account documents and ledger log behind a transactional API
#[derive(Debug)]
pub struct AccountStore {
    companies: DashMap<CompanyId, Versioned<CompanyAccount>>,
    users: DashMap<UserId, Versioned<UserAccount>>,
    log: LedgerLog,

    /// Serializes validation + apply of commits
    commit_lock: Mutex<()>,
    retry: RetryPolicy,
}

impl AccountStore {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            companies: DashMap::new(),
            users: DashMap::new(),
            log: LedgerLog::new(),
            commit_lock: Mutex::new(()),
            retry,
        }
    }

    /// The ledger entry log
    pub fn log(&self) -> &LedgerLog {
        &self.log
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Create a company account with an opening balance
    ///
    /// Provisioning happens out-of-band; the transfer engine never creates companies.
    pub fn provision_company(
        &self,
        company_id: &str,
        current_points: Points,
    ) -> Result<CompanyAccount, LedgerError> {
        if company_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument("company id must not be empty"));
        }

        let _guard = self.lock_commits();
        match self.companies.entry(company_id.to_string()) {
            Entry::Occupied(_) => Err(LedgerError::precondition_failed(format!(
                "company {} already exists",
                company_id
            ))),
            Entry::Vacant(vacant) => {
                let account = CompanyAccount::new(company_id, current_points);
                vacant.insert(Versioned {
                    version: 1,
                    value: account.clone(),
                });
                Ok(account)
            }
        }
    }

    /// Current state of a company account
    pub fn company(&self, company_id: &str) -> Option<CompanyAccount> {
        self.companies
            .get(company_id)
            .map(|entry| entry.value().value.clone())
    }

    /// Current state of a user account
    pub fn user(&self, user_id: &str) -> Option<UserAccount> {
        self.users
            .get(user_id)
            .map(|entry| entry.value().value.clone())
    }

    /// All company accounts, sorted by id
    pub fn companies(&self) -> Vec<CompanyAccount> {
        let mut companies: Vec<_> = self
            .companies
            .iter()
            .map(|entry| entry.value().value.clone())
            .collect();
        companies.sort_by(|a, b| a.company_id.cmp(&b.company_id));
        companies
    }

    /// All user accounts, sorted by id
    pub fn users(&self) -> Vec<UserAccount> {
        let mut users: Vec<_> = self
            .users
            .iter()
            .map(|entry| entry.value().value.clone())
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    /// Consistent multi-document view, never between the halves of a commit
    pub fn snapshot(&self) -> StoreSnapshot {
        let _guard = self.lock_commits();
        StoreSnapshot {
            companies: self.companies(),
            users: self.users(),
            ledger_len: self.log.len(),
        }
    }

    /// Open a new transaction
    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            store: self,
            reads: HashMap::new(),
            companies: HashMap::new(),
            users: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Validate and apply a transaction
    ///
    /// Fails with `Conflict` (and applies nothing) if any document the
    /// transaction read has changed since, or if one of its entries carries a
    /// reference that is already in the log.
    pub fn commit(&self, txn: Transaction<'_>) -> Result<Vec<LedgerEntry>, LedgerError> {
        let Transaction {
            reads,
            companies,
            users,
            entries,
            ..
        } = txn;

        let _guard = self.lock_commits();

        for (key, observed) in &reads {
            if self.current_version(key) != *observed {
                return Err(LedgerError::conflict(key));
            }
        }

        for entry in &entries {
            if let Some(reference) = &entry.reference {
                if self.log.contains_reference(entry.entry_type, reference) {
                    return Err(LedgerError::conflict(DocKey::Reference(
                        entry.entry_type,
                        reference.clone(),
                    )));
                }
            }
        }

        for (id, account) in companies {
            let version = self.companies.get(&id).map_or(0, |v| v.version) + 1;
            self.companies.insert(
                id,
                Versioned {
                    version,
                    value: account,
                },
            );
        }

        for (id, account) in users {
            let version = self.users.get(&id).map_or(0, |v| v.version) + 1;
            self.users.insert(
                id,
                Versioned {
                    version,
                    value: account,
                },
            );
        }

        Ok(self.log.append(entries))
    }

    /// Run `body` in a transaction, retrying on conflicts
    ///
    /// The body may run several times and must not have side effects outside
    /// the transaction. An error returned by the body aborts immediately with
    /// nothing written. Conflicts are retried with exponential backoff; once
    /// the retry policy is exhausted the result is an `Internal` error.
    pub async fn run_transaction<T, F>(
        &self,
        label: &str,
        mut body: F,
    ) -> Result<Committed<T>, LedgerError>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T, LedgerError> + Send,
        T: Send,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut txn = self.begin();
            let value = body(&mut txn)?;

            match self.commit(txn) {
                Ok(entries) => {
                    return Ok(Committed {
                        value,
                        entries,
                        attempts: attempt,
                    })
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    debug!(
                        transaction = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{}, retrying",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    warn!(transaction = label, attempt, "{}, giving up", e);
                    return Err(LedgerError::internal(format!(
                        "transaction {} aborted after {} attempts",
                        label, attempt
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn current_version(&self, key: &DocKey) -> Option<u64> {
        match key {
            DocKey::Company(id) => self.companies.get(id).map(|v| v.version),
            DocKey::User(id) => self.users.get(id).map(|v| v.version),
            DocKey::Reference(entry_type, reference) => self
                .log
                .contains_reference(*entry_type, reference)
                .then_some(0),
        }
    }

    fn lock_commits(&self) -> std::sync::MutexGuard<'_, ()> {
        self.commit_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// An open store transaction
///
/// Reads must come before writes: once something has been written, only keys
/// already read or written may be read again. Reads of written keys return
/// the buffered value.
#[derive(Debug)]
pub struct Transaction<'a> {
    store: &'a AccountStore,
    reads: HashMap<DocKey, Option<u64>>,
    companies: HashMap<CompanyId, CompanyAccount>,
    users: HashMap<UserId, UserAccount>,
    entries: Vec<PendingEntry>,
}

impl Transaction<'_> {
    /// Read a company account
    pub fn company(&mut self, company_id: &str) -> Result<Option<CompanyAccount>, LedgerError> {
        if let Some(buffered) = self.companies.get(company_id) {
            return Ok(Some(buffered.clone()));
        }

        let key = DocKey::Company(company_id.to_string());
        self.ensure_readable(&key)?;

        let current = self
            .store
            .companies
            .get(company_id)
            .map(|entry| entry.value().clone());
        self.reads
            .entry(key)
            .or_insert(current.as_ref().map(|v| v.version));
        Ok(current.map(|v| v.value))
    }

    /// Read a user account
    pub fn user(&mut self, user_id: &str) -> Result<Option<UserAccount>, LedgerError> {
        if let Some(buffered) = self.users.get(user_id) {
            return Ok(Some(buffered.clone()));
        }

        let key = DocKey::User(user_id.to_string());
        self.ensure_readable(&key)?;

        let current = self
            .store
            .users
            .get(user_id)
            .map(|entry| entry.value().clone());
        self.reads
            .entry(key)
            .or_insert(current.as_ref().map(|v| v.version));
        Ok(current.map(|v| v.value))
    }

    /// Look up the entry of this type already committed under an external reference
    pub fn find_reference(
        &mut self,
        entry_type: EntryType,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let key = DocKey::Reference(entry_type, reference.to_string());
        self.ensure_readable(&key)?;

        let existing = self.store.log.find_by_reference(entry_type, reference);
        self.reads
            .entry(key)
            .or_insert(existing.as_ref().map(|_| 0));
        Ok(existing)
    }

    /// Buffer a company account write
    pub fn put_company(&mut self, account: CompanyAccount) {
        self.companies.insert(account.company_id.clone(), account);
    }

    /// Buffer a user account write
    pub fn put_user(&mut self, account: UserAccount) {
        self.users.insert(account.user_id.clone(), account);
    }

    /// Buffer a ledger entry, appended on commit
    pub fn append_entry(&mut self, entry: PendingEntry) {
        self.entries.push(entry);
    }

    pub fn has_writes(&self) -> bool {
        !self.companies.is_empty() || !self.users.is_empty() || !self.entries.is_empty()
    }

    fn ensure_readable(&self, key: &DocKey) -> Result<(), LedgerError> {
        if self.has_writes() && !self.reads.contains_key(key) {
            return Err(LedgerError::internal(format!(
                "read of {} after writes; transactions must read before writing",
                key
            )));
        }
        Ok(())
    }
}
