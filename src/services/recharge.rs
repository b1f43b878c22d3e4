//! Recharge reconciliation
//!
//! Companies buy points through the payment gateway. The gateway then calls
//! back with an invoice token, and that callback is the only input this
//! service takes from the network. Company and amount always come from the
//! gateway's own answer to `verify_invoice`, never from the callback body.
//!
//! Callbacks are always acknowledged. Whatever goes wrong is logged and
//! recorded in the [`VerificationAudit`]; a gateway that sees a failure
//! would only redeliver. The invoice token is the ledger reference of the
//! credit, so a redelivered callback credits at most once.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::floor_points;
use crate::core::TransferEngine;
use crate::gateway::{Invoice, InvoiceRequest, InvoiceStatus, PaymentGateway};
use crate::types::{Auxiliary, LedgerEntry, LedgerError, Points, Posting, RechargeRequest};

/// Reply sent back to the gateway for every callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    /// Always true
    pub success: bool,
    pub message: String,
}

impl Acknowledgement {
    fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// What reconciling one invoice token did
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The company was credited by this call
    Credited(LedgerEntry),
    /// The token had already been credited; nothing moved
    AlreadyCredited(LedgerEntry),
    /// The gateway does not report the invoice as paid
    NotCompleted(InvoiceStatus),
}

/// Audit form of a reconcile result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Credited { points: u64 },
    AlreadyCredited,
    NotCompleted { status: String },
    Failed { reason: String },
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Credited { points } => write!(f, "credited {} points", points),
            AttemptOutcome::AlreadyCredited => write!(f, "already credited"),
            AttemptOutcome::NotCompleted { status } => write!(f, "not completed ({})", status),
            AttemptOutcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

impl From<&Result<ReconcileOutcome, LedgerError>> for AttemptOutcome {
    fn from(result: &Result<ReconcileOutcome, LedgerError>) -> Self {
        match result {
            Ok(ReconcileOutcome::Credited(entry)) => AttemptOutcome::Credited {
                points: entry.amount,
            },
            Ok(ReconcileOutcome::AlreadyCredited(_)) => AttemptOutcome::AlreadyCredited,
            Ok(ReconcileOutcome::NotCompleted(status)) => AttemptOutcome::NotCompleted {
                status: status.to_string(),
            },
            Err(e) => AttemptOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}

/// One verification attempt for an invoice token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationAttempt {
    pub token: String,
    pub at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// Every verification attempt, successful or not, grouped by invoice token
#[derive(Debug, Default)]
pub struct VerificationAudit {
    attempts: DashMap<String, Vec<VerificationAttempt>>,
}

impl VerificationAudit {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, token: &str, outcome: AttemptOutcome) {
        self.attempts
            .entry(token.to_string())
            .or_default()
            .push(VerificationAttempt {
                token: token.to_string(),
                at: Utc::now(),
                outcome,
            });
    }

    /// Attempts for one token, oldest first
    pub fn attempts_for(&self, token: &str) -> Vec<VerificationAttempt> {
        self.attempts
            .get(token)
            .map(|attempts| attempts.value().clone())
            .unwrap_or_default()
    }

    /// Total number of recorded attempts
    pub fn len(&self) -> usize {
        self.attempts.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Only the token is read from a callback; everything else is untrusted
#[derive(Debug, Deserialize)]
struct CallbackBody {
    invoice_token: Option<String>,
}

/// Starts recharges and credits them once the gateway confirms payment
pub struct RechargeReconciliationService {
    engine: TransferEngine,
    gateway: Arc<dyn PaymentGateway>,
    points_per_currency_unit: Decimal,
    audit: VerificationAudit,
}

impl RechargeReconciliationService {
    pub fn new(
        engine: TransferEngine,
        gateway: Arc<dyn PaymentGateway>,
        points_per_currency_unit: Decimal,
    ) -> Self {
        Self {
            engine,
            gateway,
            points_per_currency_unit,
            audit: VerificationAudit::new(),
        }
    }

    pub fn audit(&self) -> &VerificationAudit {
        &self.audit
    }

    /// Open a checkout invoice for a company to buy points
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - non-positive amount, an amount worth no points, or empty company id
    /// * `NotFound` - the company does not exist
    /// * `Internal` - the gateway refused or failed
    #[tracing::instrument(name = "initiate_recharge", skip_all, fields(company_id = %company_id, amount = %amount))]
    pub async fn initiate_recharge(
        &self,
        company_id: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<Invoice, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_argument(format!(
                "recharge amount must be positive, got {}",
                amount
            )));
        }
        self.points_for_payment(amount)?;
        if company_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument("company id must not be empty"));
        }
        if self.engine.store().company(company_id).is_none() {
            return Err(LedgerError::not_found(format!(
                "company {} not found",
                company_id
            )));
        }

        let invoice = self
            .gateway
            .create_invoice(InvoiceRequest {
                company_id: company_id.to_string(),
                amount,
                description: description.to_string(),
            })
            .await?;

        info!(invoice_token = %invoice.token, "recharge invoice created");
        Ok(invoice)
    }

    /// Handle a payment callback
    ///
    /// Never fails: the returned acknowledgement always reports success.
    #[tracing::instrument(name = "recharge_callback", skip_all)]
    pub async fn handle_callback(&self, body: &[u8]) -> Acknowledgement {
        let token = match serde_json::from_slice::<CallbackBody>(body) {
            Ok(CallbackBody {
                invoice_token: Some(token),
            }) if !token.trim().is_empty() => token,
            Ok(_) => {
                warn!("callback without invoice token ignored");
                return Acknowledgement::new("missing invoice token, ignored");
            }
            Err(e) => {
                warn!("unreadable callback body ignored: {}", e);
                return Acknowledgement::new("unreadable callback body, ignored");
            }
        };

        match self.reconcile(&token).await {
            Ok(ReconcileOutcome::Credited(_)) => Acknowledgement::new("recharge credited"),
            Ok(ReconcileOutcome::AlreadyCredited(_)) => {
                Acknowledgement::new("recharge already credited")
            }
            Ok(ReconcileOutcome::NotCompleted(_)) => Acknowledgement::new("payment not completed"),
            Err(e) => {
                error!(invoice_token = %token, code = %e.code(), "recharge callback absorbed: {}", e);
                Acknowledgement::new("internal error ignored")
            }
        }
    }

    /// Verify an invoice with the gateway and credit its company once
    ///
    /// The attempt is recorded in the audit whatever the result.
    #[tracing::instrument(name = "reconcile", skip_all, fields(invoice_token = %token))]
    pub async fn reconcile(&self, token: &str) -> Result<ReconcileOutcome, LedgerError> {
        let result = self.verify_and_credit(token).await;
        self.audit.record(token, AttemptOutcome::from(&result));
        result
    }

    async fn verify_and_credit(&self, token: &str) -> Result<ReconcileOutcome, LedgerError> {
        let verification = self.gateway.verify_invoice(token).await?;

        if verification.status != InvoiceStatus::Completed {
            warn!(status = %verification.status, "payment not completed");
            return Ok(ReconcileOutcome::NotCompleted(verification.status));
        }

        let company_id = verification.company_id.ok_or_else(|| {
            LedgerError::precondition_failed(format!(
                "verified invoice {} carries no company",
                token
            ))
        })?;

        let points = self.points_for_payment(verification.verified_amount)?;

        let posting = self
            .engine
            .recharge(RechargeRequest {
                company_id,
                amount: points,
                auxiliary: Auxiliary::Recharge {
                    amount_paid: verification.verified_amount,
                    provider: self.gateway.provider().to_string(),
                },
                reference: Some(token.to_string()),
            })
            .await?;

        Ok(match posting {
            Posting::Applied(entry) => ReconcileOutcome::Credited(entry),
            Posting::Replayed(entry) => ReconcileOutcome::AlreadyCredited(entry),
        })
    }

    fn points_for_payment(&self, amount: Decimal) -> Result<Points, LedgerError> {
        floor_points(amount, self.points_per_currency_unit)
            .filter(|points| *points > 0)
            .ok_or_else(|| {
                LedgerError::invalid_argument(format!(
                    "amount {} does not convert to a positive number of points",
                    amount
                ))
            })
    }
}
