//! Synchronous CSV reader for seed files
//!
//! Seed files (company balances, agent bindings, gateway invoices) are small
//! and are loaded once before any operation runs, so they are read with the
//! blocking `csv` reader.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, unreadable header) are returned from `new()`
//! - Individual row errors are yielded as `Err` items, with their line number

use crate::types::LedgerError;
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::Path;

/// Streaming reader over the rows of one CSV file
#[derive(Debug)]
pub struct SyncReader<T> {
    reader: csv::Reader<File>,
    _record: PhantomData<T>,
}

impl<T: DeserializeOwned> SyncReader<T> {
    /// Open a CSV file and read its header
    ///
    /// The reader trims whitespace from all fields and tolerates rows with
    /// missing trailing columns.
    ///
    /// # Returns
    ///
    /// * `Ok(SyncReader)` if the file opened and has a readable header
    /// * `Err(LedgerError::FileNotFound)` if the path does not exist
    /// * `Err(LedgerError::IoError | ParseError)` otherwise
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LedgerError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => LedgerError::IoError {
                message: format!("Failed to open file '{}': {}", path.display(), e),
            },
        })?;

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);
        reader.headers()?;

        Ok(Self {
            reader,
            _record: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for SyncReader<T> {
    type Item = Result<T, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rows = self.reader.deserialize::<T>();
        rows.next().map(|row| row.map_err(LedgerError::from))
    }
}

/// Read every row of a seed file
///
/// Malformed rows are logged and skipped, like malformed operations.
pub fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, LedgerError> {
    let mut rows = Vec::new();
    for row in SyncReader::<T>::new(path)? {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => tracing::warn!(file = %path.display(), "skipping seed row: {}", e),
        }
    }
    Ok(rows)
}
