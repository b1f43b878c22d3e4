//! CSV formats for seeds, operations and output
//!
//! This module centralizes all CSV format concerns, providing:
//! - Record structures for deserialization (`SeedRecord`, `AgentRecord`,
//!   `InvoiceRecord`, `OperationRecord`)
//! - Conversion from raw records to domain types
//! - Balance and ledger output serialization
//!
//! All conversions are pure (no I/O) for easy testing.

use crate::gateway::InvoiceStatus;
use crate::services::DepositRequest;
use crate::types::{
    CallerIdentity, CompanyAccount, CompanyId, LedgerEntry, LedgerError, Points, UserAccount,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Company seed row: `company,points`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SeedRecord {
    pub company: CompanyId,
    pub points: Points,
}

/// Agent binding row: `token,agent,company`
///
/// An empty company column registers an agent without a company.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AgentRecord {
    pub token: String,
    pub agent: String,
    pub company: Option<CompanyId>,
}

impl From<AgentRecord> for CallerIdentity {
    fn from(record: AgentRecord) -> Self {
        CallerIdentity {
            token: record.token,
            agent_id: record.agent,
            company_id: record.company.filter(|company| !company.is_empty()),
        }
    }
}

/// Gateway invoice row: `token,company,amount,status`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InvoiceRecord {
    pub token: String,
    pub company: Option<CompanyId>,
    pub amount: String,
    pub status: String,
}

/// Invoice ready to be loaded into a simulated gateway
#[derive(Debug, Clone, PartialEq)]
pub struct SeedInvoice {
    pub token: String,
    pub company_id: Option<CompanyId>,
    pub amount: Decimal,
    pub status: InvoiceStatus,
}

/// Convert an InvoiceRecord, parsing the amount and status
pub fn convert_invoice_record(record: InvoiceRecord) -> Result<SeedInvoice, LedgerError> {
    let amount = Decimal::from_str(record.amount.trim()).map_err(|_| {
        LedgerError::invalid_argument(format!(
            "Invalid amount '{}' for invoice {}",
            record.amount, record.token
        ))
    })?;

    Ok(SeedInvoice {
        token: record.token,
        company_id: record.company.filter(|company| !company.is_empty()),
        amount,
        status: InvoiceStatus::from(record.status.as_str()),
    })
}

/// Operation row: `op,token,user,weight,reference`
///
/// Columns unused by an operation may be left empty.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OperationRecord {
    pub op: String,
    pub token: String,
    pub user: Option<String>,
    pub weight: Option<String>,
    pub reference: Option<String>,
}

/// One operation to replay against the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// A deposit validated by the agent holding `token`
    Deposit {
        token: String,
        request: DepositRequest,
    },
    /// A gateway callback carrying an invoice token
    Callback { invoice_token: String },
}

/// Convert an OperationRecord to an Operation
///
/// `op` is case-insensitive. A deposit needs a user and a parseable weight;
/// weight sign and size are left to the deposit service. A callback only
/// needs its token.
pub fn convert_operation_record(record: OperationRecord) -> Result<Operation, LedgerError> {
    match record.op.to_lowercase().as_str() {
        "deposit" => {
            let user_id = record
                .user
                .filter(|user| !user.is_empty())
                .ok_or_else(|| {
                    LedgerError::invalid_argument(format!(
                        "deposit by token '{}' requires a user",
                        record.token
                    ))
                })?;

            let weight_kg = match record.weight.as_deref().map(str::trim) {
                Some(weight) if !weight.is_empty() => Decimal::from_str(weight).map_err(|_| {
                    LedgerError::invalid_argument(format!(
                        "Invalid weight '{}' for user {}",
                        weight, user_id
                    ))
                })?,
                _ => {
                    return Err(LedgerError::invalid_argument(format!(
                        "deposit for user {} requires a weight",
                        user_id
                    )))
                }
            };

            Ok(Operation::Deposit {
                token: record.token,
                request: DepositRequest {
                    user_id,
                    weight_kg,
                    reference: record.reference.filter(|reference| !reference.is_empty()),
                },
            })
        }
        "callback" => Ok(Operation::Callback {
            invoice_token: record.token,
        }),
        _ => Err(LedgerError::invalid_argument(format!(
            "Invalid operation: '{}'",
            record.op
        ))),
    }
}

/// Write final balances to CSV format
///
/// Writes rows with columns: kind, id, points. Companies come first, then
/// users, each sorted by id for deterministic output.
pub fn write_balances_csv(
    companies: &[CompanyAccount],
    users: &[UserAccount],
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(["kind", "id", "points"])?;

    let mut companies: Vec<_> = companies.iter().collect();
    companies.sort_by(|a, b| a.company_id.cmp(&b.company_id));
    for company in companies {
        let points = company.current_points.to_string();
        writer.write_record(["company", company.company_id.as_str(), points.as_str()])?;
    }

    let mut users: Vec<_> = users.iter().collect();
    users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    for user in users {
        let points = user.points.to_string();
        writer.write_record(["user", user.user_id.as_str(), points.as_str()])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write ledger entries to CSV format, in log order
///
/// Columns: id, type, source, destination, amount, reference, timestamp, details
pub fn write_ledger_csv(entries: &[LedgerEntry], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "id",
        "type",
        "source",
        "destination",
        "amount",
        "reference",
        "timestamp",
        "details",
    ])?;

    for entry in entries {
        writer.write_record([
            entry.id.to_string(),
            entry.entry_type.to_string(),
            entry.source.to_string(),
            entry.destination.to_string(),
            entry.amount.to_string(),
            entry.reference.clone().unwrap_or_default(),
            entry.timestamp.to_rfc3339(),
            entry.auxiliary.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
