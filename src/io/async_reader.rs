//! Asynchronous CSV reader for operation files
//!
//! Operations files can be large, so they are streamed in batches with
//! csv-async instead of being loaded whole.
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of Operations
//!                  ↓
//!           csv_format module
//!   (OperationRecord, convert_operation_record)
//! ```

use crate::io::csv_format::{convert_operation_record, Operation, OperationRecord};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::warn;

/// Batch reader over operation records
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self { csv_reader }
    }

    /// Read up to `batch_size` operations
    ///
    /// Rows that fail to parse or convert are logged and skipped. Returns an
    /// empty vector at end of file.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<Operation> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<OperationRecord>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(record)) => match convert_operation_record(record) {
                    Ok(operation) => batch.push(operation),
                    Err(e) => warn!("skipping operation: {}", e),
                },
                Some(Err(e)) => warn!("skipping unreadable operation row: {}", e),
                None => break,
            }
        }

        batch
    }
}
