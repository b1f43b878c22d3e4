//! Transfer engine
//!
//! This module provides the `TransferEngine`, the only component allowed to
//! change balances. Each operation is a single store transaction that reads
//! every document it needs, checks the business rules, writes the new balances
//! and appends its ledger entry, all or nothing.
//!
//! # Operations
//!
//! - `transfer_company_to_user`: debit a company, credit a user (creating the
//!   user account on first credit), record a `CREDIT_USER` entry
//! - `recharge`: credit a company from externally verified funds, record a
//!   `RECHARGE_COMPANY` entry. No internal debit: the caller is trusted to
//!   have verified the funds.
//!
//! # Idempotency
//!
//! A request carrying a `reference` that is already in the log for the same
//! kind of posting is answered with `Posting::Replayed(existing_entry)` and
//! moves nothing. Transfer request ids and invoice tokens live in separate
//! namespaces. The reference
//! lookup is a transactional read, so two concurrent deliveries of the same
//! reference cannot both commit.
//!
//! # Thread Safety
//!
//! The engine holds no locks; it is a cheap `Clone` over an `Arc<AccountStore>`
//! and all ordering is delegated to the store's optimistic transactions.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::core::store::{AccountStore, Committed};
use crate::types::{
    AccountRef, Auxiliary, CallerIdentity, EntryType, LedgerEntry, LedgerError, PendingEntry,
    Points, Posting, RechargeRequest, TransferRequest, UserAccount,
};

/// Source name used for recharges whose auxiliary data names no provider
const DEFAULT_EXTERNAL_SOURCE: &str = "external";

/// Atomic point transfers against the account store
#[derive(Debug, Clone)]
pub struct TransferEngine {
    store: Arc<AccountStore>,
}

impl TransferEngine {
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    /// Move `amount` points from a company to a user
    ///
    /// # Returns
    ///
    /// * `Ok(Posting::Applied(entry))` - Balances moved, entry committed
    /// * `Ok(Posting::Replayed(entry))` - Reference already posted, nothing moved
    /// * `Err(LedgerError::Unauthenticated)` - Empty caller identity token
    /// * `Err(LedgerError::InvalidArgument)` - Zero amount, empty ids, reused reference
    /// * `Err(LedgerError::PreconditionFailed)` - Company not found
    /// * `Err(LedgerError::ResourceExhausted)` - Company balance below `amount`
    /// * `Err(LedgerError::Internal)` - Store gave up after repeated conflicts
    #[tracing::instrument(
        name = "transfer_company_to_user",
        skip_all,
        fields(company_id = %request.company_id, user_id = %request.user_id, amount = request.amount)
    )]
    pub async fn transfer_company_to_user(
        &self,
        request: TransferRequest,
        caller: &CallerIdentity,
    ) -> Result<Posting, LedgerError> {
        if !caller.is_authenticated() {
            warn!("transfer refused: caller identity token is empty");
            return Err(LedgerError::unauthenticated(
                "a non-empty caller identity is required to transfer points",
            ));
        }
        require_id("company", &request.company_id)?;
        require_id("user", &request.user_id)?;
        require_positive(request.amount)?;

        let TransferRequest {
            company_id,
            user_id,
            amount,
            auxiliary,
            reference,
        } = request;

        let result = self
            .store
            .run_transaction("transfer_company_to_user", |txn| {
                if let Some(reference) = &reference {
                    if let Some(existing) = txn.find_reference(EntryType::CreditUser, reference)? {
                        ensure_same_posting(
                            &existing,
                            EntryType::CreditUser,
                            &company_id,
                            Some(&user_id),
                            amount,
                        )?;
                        return Ok(Some(existing));
                    }
                }

                let company = txn.company(&company_id)?;
                let user = txn.user(&user_id)?;

                let mut company =
                    company.ok_or_else(|| LedgerError::precondition_failed("company not found"))?;
                if company.current_points < amount {
                    return Err(LedgerError::resource_exhausted(
                        &company_id,
                        company.current_points,
                        amount,
                    ));
                }
                company.current_points -= amount;

                let mut user = user.unwrap_or_else(|| UserAccount::new(user_id.as_str(), Utc::now()));
                user.points = user.points.checked_add(amount).ok_or_else(|| {
                    LedgerError::arithmetic_overflow("credit", &format!("user:{}", user_id))
                })?;

                txn.put_company(company);
                txn.put_user(user);
                txn.append_entry(PendingEntry {
                    entry_type: EntryType::CreditUser,
                    source: AccountRef::Company(company_id.clone()),
                    destination: AccountRef::User(user_id.clone()),
                    amount,
                    auxiliary: auxiliary.clone(),
                    reference: reference.clone(),
                });
                Ok(None)
            })
            .await;

        match into_posting(result) {
            Ok(posting) => {
                log_posting(&posting);
                Ok(posting)
            }
            Err(e) => {
                warn!(code = %e.code(), "transfer rejected: {}", e);
                Err(e)
            }
        }
    }

    /// Credit a company with externally verified funds
    ///
    /// # Returns
    ///
    /// * `Ok(Posting::Applied(entry))` - Company credited, entry committed
    /// * `Ok(Posting::Replayed(entry))` - Reference already credited, nothing moved
    /// * `Err(LedgerError::InvalidArgument)` - Zero amount, empty id, reused reference
    /// * `Err(LedgerError::NotFound)` - Company not found
    /// * `Err(LedgerError::ArithmeticOverflow)` - Balance would overflow
    #[tracing::instrument(
        name = "recharge",
        skip_all,
        fields(company_id = %request.company_id, amount = request.amount, reference = ?request.reference)
    )]
    pub async fn recharge(&self, request: RechargeRequest) -> Result<Posting, LedgerError> {
        require_id("company", &request.company_id)?;
        require_positive(request.amount)?;

        let RechargeRequest {
            company_id,
            amount,
            auxiliary,
            reference,
        } = request;

        let source = match &auxiliary {
            Auxiliary::Recharge { provider, .. } if !provider.is_empty() => provider.clone(),
            _ => DEFAULT_EXTERNAL_SOURCE.to_string(),
        };

        let result = self
            .store
            .run_transaction("recharge", |txn| {
                if let Some(reference) = &reference {
                    if let Some(existing) =
                        txn.find_reference(EntryType::RechargeCompany, reference)?
                    {
                        ensure_same_posting(
                            &existing,
                            EntryType::RechargeCompany,
                            &company_id,
                            None,
                            amount,
                        )?;
                        return Ok(Some(existing));
                    }
                }

                let mut company = txn.company(&company_id)?.ok_or_else(|| {
                    LedgerError::not_found(format!("company {} not found", company_id))
                })?;
                company.current_points =
                    company.current_points.checked_add(amount).ok_or_else(|| {
                        LedgerError::arithmetic_overflow("recharge", &format!("company:{}", company_id))
                    })?;

                txn.put_company(company);
                txn.append_entry(PendingEntry {
                    entry_type: EntryType::RechargeCompany,
                    source: AccountRef::External(source.clone()),
                    destination: AccountRef::Company(company_id.clone()),
                    amount,
                    auxiliary: auxiliary.clone(),
                    reference: reference.clone(),
                });
                Ok(None)
            })
            .await;

        match into_posting(result) {
            Ok(posting) => {
                log_posting(&posting);
                Ok(posting)
            }
            Err(e) => {
                warn!(code = %e.code(), "recharge rejected: {}", e);
                Err(e)
            }
        }
    }
}

fn require_id(kind: &str, id: &str) -> Result<(), LedgerError> {
    if id.trim().is_empty() {
        return Err(LedgerError::invalid_argument(format!(
            "{} id must not be empty",
            kind
        )));
    }
    Ok(())
}

fn require_positive(amount: Points) -> Result<(), LedgerError> {
    if amount == 0 {
        return Err(LedgerError::invalid_argument("amount must be a positive number of points"));
    }
    Ok(())
}

/// A reference may only ever stand for one posting
fn ensure_same_posting(
    existing: &LedgerEntry,
    entry_type: EntryType,
    company_id: &str,
    user_id: Option<&str>,
    amount: Points,
) -> Result<(), LedgerError> {
    let same = existing.entry_type == entry_type
        && existing.company_id() == Some(company_id)
        && existing.user_id() == user_id
        && existing.amount == amount;

    if same {
        Ok(())
    } else {
        Err(LedgerError::invalid_argument(format!(
            "reference {} already used by entry {} for a different posting",
            existing.reference.as_deref().unwrap_or_default(),
            existing.id
        )))
    }
}

fn into_posting(
    result: Result<Committed<Option<LedgerEntry>>, LedgerError>,
) -> Result<Posting, LedgerError> {
    let committed = result?;
    match committed.value {
        Some(existing) => Ok(Posting::Replayed(existing)),
        None => committed
            .entries
            .into_iter()
            .next()
            .map(Posting::Applied)
            .ok_or_else(|| LedgerError::internal("commit returned no ledger entry")),
    }
}

fn log_posting(posting: &Posting) {
    let entry = posting.entry();
    if posting.is_replay() {
        info!(
            entry_id = %entry.id,
            reference = ?entry.reference,
            "reference already posted, returning existing entry"
        );
    } else {
        info!(
            entry_id = %entry.id,
            entry_type = %entry.entry_type,
            "{} points {} -> {}",
            entry.amount,
            entry.source,
            entry.destination
        );
    }
}
