//! In-memory payment gateway
//!
//! Keeps invoices in a `DashMap` and lets tests (or the replay front end)
//! drive their status. Also counts verification calls, so callers can check
//! that nothing was credited without asking the gateway first.

use super::{
    GatewayError, Invoice, InvoiceRequest, InvoiceStatus, InvoiceVerification, PaymentGateway,
};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct SimulatedInvoice {
    company_id: Option<String>,
    amount: Decimal,
    status: InvoiceStatus,
}

#[derive(Debug)]
pub struct SimulatedGateway {
    provider: String,
    checkout_base_url: String,
    invoices: DashMap<String, SimulatedInvoice>,
    verify_calls: AtomicUsize,
}

impl SimulatedGateway {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            checkout_base_url: "https://checkout.invalid/pay".to_string(),
            invoices: DashMap::new(),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Register an invoice as if it had been created earlier
    pub fn insert_invoice(
        &self,
        token: &str,
        company_id: Option<&str>,
        amount: Decimal,
        status: InvoiceStatus,
    ) {
        self.invoices.insert(
            token.to_string(),
            SimulatedInvoice {
                company_id: company_id.map(str::to_string),
                amount,
                status,
            },
        );
    }

    /// Change the status of a known invoice
    pub fn set_status(&self, token: &str, status: InvoiceStatus) -> Result<(), GatewayError> {
        let mut invoice = self
            .invoices
            .get_mut(token)
            .ok_or_else(|| GatewayError::UnknownInvoice(token.to_string()))?;
        invoice.status = status;
        Ok(())
    }

    /// Mark an invoice as paid
    pub fn complete(&self, token: &str) -> Result<(), GatewayError> {
        self.set_status(token, InvoiceStatus::Completed)
    }

    /// Number of `verify_invoice` calls served so far
    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new("simulated")
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn create_invoice(&self, request: InvoiceRequest) -> Result<Invoice, GatewayError> {
        let token = Uuid::new_v4().simple().to_string();
        self.insert_invoice(
            &token,
            Some(&request.company_id),
            request.amount,
            InvoiceStatus::Pending,
        );

        Ok(Invoice {
            checkout_url: format!("{}/{}", self.checkout_base_url, token),
            token,
        })
    }

    async fn verify_invoice(&self, token: &str) -> Result<InvoiceVerification, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        let invoice = self
            .invoices
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GatewayError::UnknownInvoice(token.to_string()))?;

        Ok(InvoiceVerification {
            token: token.to_string(),
            status: invoice.status,
            verified_amount: invoice.amount,
            company_id: invoice.company_id,
        })
    }
}
