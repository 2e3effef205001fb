use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::batch::{Batch, RawRecord};
use crate::error::{AnalysisError, Result};

pub const REQUIRED_COLUMNS: [&str; 4] = ["client_code", "pg_pay_mode", "payment_mode", "status"];
pub const UNKNOWN_CLIENT: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBucket {
    Success,
    Failed,
    Other,
}

impl StatusBucket {
    /// Lenient substring match: "success" wins over "fail", anything else is `Other`.
    pub fn from_status(status: &str) -> Self {
        let status = status.trim().to_lowercase();
        if status.contains("success") {
            StatusBucket::Success
        } else if status.contains("fail") {
            StatusBucket::Failed
        } else {
            StatusBucket::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub client_name: String,
    pub client_code: String,
    pub route: String,
    pub payment_mode: String,
    pub status: StatusBucket,
    pub batch: String,
}

impl NormalizedRecord {
    pub fn from_raw(raw: &RawRecord) -> Self {
        let name = raw.client_name.as_deref().map(str::trim).unwrap_or_default();
        NormalizedRecord {
            client_name: if name.is_empty() {
                UNKNOWN_CLIENT.to_string()
            } else {
                name.to_string()
            },
            client_code: trimmed(&raw.client_code),
            route: trimmed(&raw.route),
            payment_mode: trimmed(&raw.payment_mode),
            status: StatusBucket::from_status(raw.status.as_deref().unwrap_or_default()),
            batch: raw.batch.clone(),
        }
    }

    pub fn is_counted(&self) -> bool {
        self.status != StatusBucket::Other
    }
}

fn trimmed(field: &Option<String>) -> String {
    field.as_deref().unwrap_or_default().trim().to_string()
}

pub fn missing_columns(batches: &[Batch]) -> Vec<String> {
    REQUIRED_COLUMNS
        .iter()
        .filter(|column| batches.iter().any(|batch| !batch.has_column(column)))
        .map(|column| column.to_string())
        .collect()
}

/// One batch without a required column fails the whole run.
pub fn normalize(batches: &[Batch]) -> Result<Vec<NormalizedRecord>> {
    let missing = missing_columns(batches);
    if !missing.is_empty() {
        let culprits: Vec<&str> = batches
            .iter()
            .filter(|batch| missing.iter().any(|column| !batch.has_column(column)))
            .map(|batch| batch.id.as_str())
            .collect();
        error!("missing columns {:?} in batches {:?}", missing, culprits);
        return Err(AnalysisError::MissingColumn(missing));
    }

    if !batches.iter().any(|batch| batch.has_column("client_name")) {
        warn!("'client_name' column not found, defaulting to '{}'", UNKNOWN_CLIENT);
    }

    Ok(batches
        .iter()
        .flat_map(|batch| batch.records.iter())
        .map(NormalizedRecord::from_raw)
        .collect())
}

#[cfg(test)]
const COLUMNS: [&str; 4] = REQUIRED_COLUMNS;

#[test]
fn status_buckets() {
    assert_eq!(StatusBucket::from_status("SUCCESS"), StatusBucket::Success);
    assert_eq!(StatusBucket::from_status("  Payment Successful "), StatusBucket::Success);
    assert_eq!(StatusBucket::from_status("Failed - timeout"), StatusBucket::Failed);
    assert_eq!(StatusBucket::from_status("FAILURE"), StatusBucket::Failed);
    assert_eq!(StatusBucket::from_status("pending"), StatusBucket::Other);
    assert_eq!(StatusBucket::from_status(""), StatusBucket::Other);
}

#[test]
fn success_takes_precedence_over_fail() {
    assert_eq!(StatusBucket::from_status("failed then success"), StatusBucket::Success);
    assert_eq!(StatusBucket::from_status("SUCCESS_AFTER_FAIL"), StatusBucket::Success);
}

#[test]
fn fields_are_trimmed_and_name_defaults() {
    let batch = Batch::new(
        "2024-01-01",
        &COLUMNS,
        vec![
            RawRecord::new(" C1 ", " BOB", "UPI ", " Success "),
            RawRecord::new("C2", "HDFC", "CARD", "x").with_client_name("  "),
            RawRecord::new("C3", "HDFC", "CARD", "x").with_client_name(" Acme "),
        ],
    );
    let records = normalize(&[batch]).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].client_code, "C1");
    assert_eq!(records[0].route, "BOB");
    assert_eq!(records[0].payment_mode, "UPI");
    assert_eq!(records[0].status, StatusBucket::Success);
    assert_eq!(records[0].client_name, UNKNOWN_CLIENT);
    assert_eq!(records[0].batch, "2024-01-01");
    assert_eq!(records[1].client_name, UNKNOWN_CLIENT);
    assert_eq!(records[2].client_name, "Acme");
    assert!(!records[2].is_counted());
}

#[test]
fn one_batch_missing_status_fails_the_run() {
    let good = Batch::new("2024-01-01", &COLUMNS, vec![RawRecord::new("C1", "BOB", "UPI", "success")]);
    let bad = Batch::new(
        "2024-01-02",
        &["client_code", "pg_pay_mode", "payment_mode"],
        vec![],
    );
    let err = normalize(&[good, bad]).unwrap_err();
    match err {
        AnalysisError::MissingColumn(columns) => assert_eq!(columns, vec!["status".to_string()]),
        other => panic!("unexpected error {:?}", other),
    }
}
