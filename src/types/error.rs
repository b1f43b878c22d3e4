//! Error types for the points ledger
//!
//! This module defines all error types that can occur while moving points.
//! Messages are meant to be shown as-is to the agent who triggered the
//! operation, so they carry the concrete ids and amounts involved.
//!
//! # Error Categories
//!
//! - **Caller Errors**: unauthenticated caller, invalid arguments
//! - **Account Errors**: missing or misconfigured accounts, insufficient balance
//! - **Store Errors**: transaction conflicts, exhausted retries
//! - **File Errors**: seed/operation files for the replay front end

use super::account::Points;
use std::fmt;
use thiserror::Error;

/// Stable error code, independent of the message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unauthenticated,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    ResourceExhausted,
    Aborted,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::NotFound => "not-found",
            ErrorCode::FailedPrecondition => "failed-precondition",
            ErrorCode::ResourceExhausted => "resource-exhausted",
            ErrorCode::Aborted => "aborted",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the points ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Missing or invalid caller identity
    #[error("Unauthenticated: {reason}")]
    Unauthenticated {
        /// Why the caller was refused
        reason: String,
    },

    /// Non-positive amount or weight, missing ids, malformed input
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument
        message: String,
    },

    /// Referenced record does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was missing
        message: String,
    },

    /// Referenced account missing or misconfigured for this operation
    #[error("Precondition failed: {message}")]
    PreconditionFailed {
        /// Description of the failed precondition
        message: String,
    },

    /// Insufficient company balance
    ///
    /// The company account and the log are left untouched.
    #[error(
        "Insufficient balance for company {company_id}: missing {shortfall} points (available {available}, requested {requested})"
    )]
    ResourceExhausted {
        /// Company whose balance was too low
        company_id: String,
        /// Balance observed inside the transaction
        available: Points,
        /// Requested transfer amount
        requested: Points,
        /// `requested - available`
        shortfall: Points,
    },

    /// A balance would leave the representable range
    #[error("Arithmetic overflow in {operation} for {account}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account that would overflow
        account: String,
    },

    /// A concurrent commit invalidated a read of this transaction
    ///
    /// Retried by the store; only surfaces from a manual `commit`.
    #[error("Transaction conflict on {key}")]
    Conflict {
        /// Document whose version changed
        key: String,
    },

    /// Store failure after exhausting retries, unexpected collaborator response
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },

    /// File not found at the specified path
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl LedgerError {
    /// Map the error onto its stable code
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::Unauthenticated { .. } => ErrorCode::Unauthenticated,
            LedgerError::InvalidArgument { .. } | LedgerError::ParseError { .. } => {
                ErrorCode::InvalidArgument
            }
            LedgerError::NotFound { .. } | LedgerError::FileNotFound { .. } => ErrorCode::NotFound,
            LedgerError::PreconditionFailed { .. } => ErrorCode::FailedPrecondition,
            LedgerError::ResourceExhausted { .. } => ErrorCode::ResourceExhausted,
            LedgerError::Conflict { .. } => ErrorCode::Aborted,
            LedgerError::ArithmeticOverflow { .. }
            | LedgerError::Internal { .. }
            | LedgerError::IoError { .. } => ErrorCode::Internal,
        }
    }

    /// Whether the store should retry the transaction that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. })
    }
}

// Conversion from io::Error to LedgerError
impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to LedgerError
impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create an Unauthenticated error
    pub fn unauthenticated(reason: &str) -> Self {
        LedgerError::Unauthenticated {
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidArgument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(message: impl Into<String>) -> Self {
        LedgerError::NotFound {
            message: message.into(),
        }
    }

    /// Create a PreconditionFailed error
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        LedgerError::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Create a ResourceExhausted error, computing the shortfall
    pub fn resource_exhausted(company_id: &str, available: Points, requested: Points) -> Self {
        LedgerError::ResourceExhausted {
            company_id: company_id.to_string(),
            available,
            requested,
            shortfall: requested.saturating_sub(available),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            account: account.to_string(),
        }
    }

    /// Create a Conflict error
    pub fn conflict(key: impl fmt::Display) -> Self {
        LedgerError::Conflict {
            key: key.to_string(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        LedgerError::Internal {
            message: message.into(),
        }
    }
}
