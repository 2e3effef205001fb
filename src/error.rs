use std::fmt;
use std::io;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    NoBatchesSelected,
    NoBatchesLoaded,
    NoValidTransactions,
}

impl fmt::Display for EmptyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            EmptyReason::NoBatchesSelected => "no batches selected",
            EmptyReason::NoBatchesLoaded => "no batches could be loaded",
            EmptyReason::NoValidTransactions => "no valid transactions (success or failed)",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("missing columns: {}", .0.join(", "))]
    MissingColumn(Vec<String>),
    #[error("batch '{batch}' could not be loaded: {reason}")]
    BatchLoad { batch: String, reason: String },
    #[error("nothing to show: {0}")]
    EmptyResult(EmptyReason),
    #[error("sync failed after deleting {deleted} and writing {written} documents: {cause}")]
    Sync {
        deleted: usize,
        written: usize,
        cause: String,
    },
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidField { field: String, value: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AnalysisError {
    /// True for the "nothing to show" terminal state, which is reported but is not a failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, AnalysisError::EmptyResult(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[test]
fn only_empty_result_is_informational() {
    assert!(AnalysisError::EmptyResult(EmptyReason::NoBatchesSelected).is_informational());
    assert!(!AnalysisError::MissingColumn(vec!["status".into()]).is_informational());
    assert!(!AnalysisError::Config("bad".into()).is_informational());
}

#[test]
fn missing_column_names_every_field() {
    let err = AnalysisError::MissingColumn(vec!["status".into(), "pg_pay_mode".into()]);
    assert_eq!(err.to_string(), "missing columns: status, pg_pay_mode");
}
