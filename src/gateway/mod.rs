//! Payment gateway collaborators
//!
//! The ledger never trusts what a payment callback claims. It only trusts
//! what the gateway itself answers to `verify_invoice`. This module defines
//! that contract and two implementations:
//!
//! - [`SimulatedGateway`] - in-memory invoices, used by the replay front end and tests
//! - [`PaydunyaGateway`] - PayDunya checkout API over HTTP

use crate::types::LedgerError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod paydunya;
pub mod simulated;

pub use paydunya::PaydunyaGateway;
pub use simulated::SimulatedGateway;

/// Invoice creation request
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRequest {
    /// Company to credit once the invoice is paid, carried as invoice metadata
    pub company_id: String,
    /// Amount to pay, in the gateway's currency
    pub amount: Decimal,
    pub description: String,
}

/// A created invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    /// Opaque token identifying the invoice at the gateway
    pub token: String,
    /// Where the payer completes the checkout
    pub checkout_url: String,
}

/// Invoice state as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceStatus {
    Pending,
    /// Terminal, paid. The only state that credits points.
    Completed,
    Cancelled,
    Failed,
    /// Any status this crate doesn't know about, kept verbatim
    Other(String),
}

impl From<&str> for InvoiceStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pending" => InvoiceStatus::Pending,
            "completed" => InvoiceStatus::Completed,
            "cancelled" | "canceled" => InvoiceStatus::Cancelled,
            "failed" => InvoiceStatus::Failed,
            _ => InvoiceStatus::Other(s.trim().to_string()),
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(InvoiceStatus::from(s))
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "pending"),
            InvoiceStatus::Completed => write!(f, "completed"),
            InvoiceStatus::Cancelled => write!(f, "cancelled"),
            InvoiceStatus::Failed => write!(f, "failed"),
            InvoiceStatus::Other(status) => write!(f, "{}", status),
        }
    }
}

/// Trusted view of an invoice, straight from the gateway's records
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceVerification {
    pub token: String,
    pub status: InvoiceStatus,
    /// Amount the gateway says was paid
    pub verified_amount: Decimal,
    /// Company recorded in the invoice metadata at creation time
    pub company_id: Option<String>,
}

/// Error from payment gateway calls
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("gateway rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
    #[error("unknown invoice: {0}")]
    UnknownInvoice(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<GatewayError> for LedgerError {
    fn from(error: GatewayError) -> Self {
        LedgerError::internal(format!("payment gateway: {}", error))
    }
}

/// External payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name, recorded as the external source of recharges
    fn provider(&self) -> &str;

    /// Create a checkout invoice
    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError>;

    /// Ask the gateway for the authoritative state of an invoice
    async fn verify_invoice(&self, token: &str) -> Result<InvoiceVerification, GatewayError>;
}
