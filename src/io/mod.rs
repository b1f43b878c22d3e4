//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - CSV formats (record conversion, output serialization)
//! - `sync_reader` - Blocking reader for seed files
//! - `async_reader` - Batch reader for operation files

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_invoice_record, convert_operation_record, write_balances_csv, write_ledger_csv,
    AgentRecord, InvoiceRecord, Operation, OperationRecord, SeedInvoice, SeedRecord,
};
pub use sync_reader::{read_all, SyncReader};
