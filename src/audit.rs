use std::fs::OpenOptions;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use log::info;
use serde::{Deserialize, Serialize};

use crate::aggregate::RowKey;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteChangeRequest {
    pub client_code: String,
    pub old_route: String,
    pub old_mode: String,
    pub new_route: String,
    pub new_mode: String,
    pub remarks: String,
    pub requested_at: DateTime<Utc>,
}

impl RouteChangeRequest {
    pub fn for_row(
        selected: &RowKey,
        new_route: &str,
        new_mode: &str,
        remarks: &str,
        requested_at: DateTime<Utc>,
    ) -> Result<Self> {
        let remarks = remarks.trim();
        if remarks.is_empty() {
            return Err(AnalysisError::InvalidField {
                field: "remarks".to_string(),
                value: String::new(),
            });
        }
        for (field, value) in [("new_route", new_route), ("new_mode", new_mode)] {
            if value.trim().is_empty() {
                return Err(AnalysisError::InvalidField {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(RouteChangeRequest {
            client_code: selected.client_code.clone(),
            old_route: selected.route.clone(),
            old_mode: selected.payment_mode.clone(),
            new_route: new_route.trim().to_string(),
            new_mode: new_mode.trim().to_string(),
            remarks: remarks.to_string(),
            requested_at,
        })
    }
}

pub trait AuditLog {
    fn append(&mut self, request: &RouteChangeRequest) -> Result<()>;
}

impl AuditLog for Vec<RouteChangeRequest> {
    fn append(&mut self, request: &RouteChangeRequest) -> Result<()> {
        self.push(request.clone());
        Ok(())
    }
}

/// Appends requests to a CSV file; the header goes in only when the file is new or empty.
pub struct CsvAuditLog {
    path: PathBuf,
}

impl CsvAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvAuditLog { path: path.into() }
    }

    pub fn read_all(&self) -> Result<Vec<RouteChangeRequest>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let requests = reader
            .deserialize()
            .collect::<std::result::Result<Vec<RouteChangeRequest>, _>>()?;
        Ok(requests)
    }
}

impl AuditLog for CsvAuditLog {
    fn append(&mut self, request: &RouteChangeRequest) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let is_new = file.metadata()?.len() == 0;
        let mut writer = WriterBuilder::new().has_headers(is_new).from_writer(file);
        writer.serialize(request)?;
        writer.flush()?;
        info!(
            "route change for {} recorded: {}/{} -> {}/{}",
            request.client_code,
            request.old_route,
            request.old_mode,
            request.new_route,
            request.new_mode
        );
        Ok(())
    }
}

#[cfg(test)]
use chrono::TimeZone;

#[cfg(test)]
fn selected() -> RowKey {
    RowKey {
        client_name: "Acme".to_string(),
        client_code: "C1".to_string(),
        route: "BOB".to_string(),
        payment_mode: "UPI".to_string(),
    }
}

#[test]
fn request_takes_old_route_from_selection() {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
    let request = RouteChangeRequest::for_row(&selected(), " HDFC ", "UPI", " too many timeouts ", at)
        .unwrap();
    assert_eq!(request.client_code, "C1");
    assert_eq!(request.old_route, "BOB");
    assert_eq!(request.old_mode, "UPI");
    assert_eq!(request.new_route, "HDFC");
    assert_eq!(request.remarks, "too many timeouts");

    let mut log: Vec<RouteChangeRequest> = Vec::new();
    AuditLog::append(&mut log, &request).unwrap();
    assert_eq!(log, vec![request]);
}

#[test]
fn blank_remarks_are_rejected() {
    let err = RouteChangeRequest::for_row(&selected(), "HDFC", "UPI", "   ", Utc::now()).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidField { ref field, .. } if field == "remarks"));
    assert!(RouteChangeRequest::for_row(&selected(), "", "UPI", "why", Utc::now()).is_err());
}

#[test]
fn csv_log_writes_header_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("route_changes.csv");
    let mut log = CsvAuditLog::new(&path);
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
    let first = RouteChangeRequest::for_row(&selected(), "HDFC", "UPI", "timeouts", at).unwrap();
    let second = RouteChangeRequest::for_row(&selected(), "ICICI", "CARD", "retry", at).unwrap();
    log.append(&first).unwrap();
    log.append(&second).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches("client_code").count(), 1);
    assert_eq!(log.read_all().unwrap(), vec![first, second]);
}
