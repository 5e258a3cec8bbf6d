//! Batch conversion of buffered records into columnar files.
//!
//! A conversion attempt produces a list of [`WriteResult`]s: one per failed
//! record (the batch continues past them) and, when the file itself could
//! not be opened or finalized, a single record-less entry that marks the
//! whole batch as failed.

mod parquet;
mod schema;

pub use parquet::{ConvertOutput, ParquetConverter};
pub use schema::{load_schema_description, parse_schema_description, schema_for, typed_schema};

use crate::record::Record;
use crate::Error;

/// Outcome of one batch-write attempt for a single record or for the batch
/// file itself.
///
/// An entry carrying a record failed encoding while the rest of the batch
/// continued; an entry carrying an error but no record means the output
/// stream is not trustworthy and the whole batch failed.
#[derive(Debug)]
pub struct WriteResult {
    /// Partition key of the batch
    pub key: String,
    /// The failure, if any
    pub error: Option<Error>,
    /// The offending record, for record-level failures
    pub record: Option<Record>,
}

impl WriteResult {
    /// A single record failed encoding.
    pub fn record_failure(key: &str, error: Error, record: Record) -> Self {
        Self {
            key: key.to_string(),
            error: Some(error),
            record: Some(record),
        }
    }

    /// The batch file failed as a whole.
    pub fn batch_failure(key: &str, error: Error) -> Self {
        Self {
            key: key.to_string(),
            error: Some(error),
            record: None,
        }
    }

    /// Whether this entry marks the whole batch as failed.
    pub fn is_batch_failure(&self) -> bool {
        self.error.is_some() && self.record.is_none()
    }
}

/// True iff any result carries an error. False for the empty list.
pub fn check_failed(results: &[WriteResult]) -> bool {
    results.iter().any(|r| r.error.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConvertError;

    #[test]
    fn test_check_failed_empty_list() {
        assert!(!check_failed(&[]));
    }

    #[test]
    fn test_check_failed_detects_errors() {
        let ok = WriteResult {
            key: "k".into(),
            error: None,
            record: None,
        };
        assert!(!check_failed(&[ok]));

        let failed = WriteResult::batch_failure(
            "k",
            ConvertError::Finalize("footer write failed".into()).into(),
        );
        assert!(failed.is_batch_failure());
        assert!(check_failed(&[failed]));
    }
}
