use std::io;
use std::str::FromStr;

use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::aggregate::AggregateRow;
use crate::classify::HealthTier;
use crate::error::{AnalysisError, Result};

pub const EXPORT_COLUMNS: [&str; 9] = [
    "client_name",
    "client_code",
    "pg_pay_mode",
    "payment_mode",
    "success_count",
    "failed_count",
    "total",
    "success_rate",
    "health_tier",
];

pub fn write_summary<T: io::Write>(rows: &[AggregateRow], target: T) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(target);
    if rows.is_empty() {
        writer.write_record(&EXPORT_COLUMNS[..EXPORT_COLUMNS.len() - 1])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn to_csv_bytes(rows: &[AggregateRow]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    write_summary(rows, &mut output)?;
    Ok(output)
}

#[derive(Deserialize)]
struct ExportedRow {
    client_name: String,
    client_code: String,
    pg_pay_mode: String,
    payment_mode: String,
    success_count: u64,
    failed_count: u64,
    total: u64,
    success_rate: String,
    health_tier: Option<HealthTier>,
}

pub fn read_summary<R: io::Read>(source: R) -> Result<Vec<AggregateRow>> {
    let mut reader = csv::Reader::from_reader(source);
    let mut rows = Vec::new();
    for exported in reader.deserialize::<ExportedRow>() {
        let exported = exported?;
        let success_rate = Decimal::from_str(exported.success_rate.trim()).map_err(|_| {
            AnalysisError::InvalidField {
                field: "success_rate".to_string(),
                value: exported.success_rate.clone(),
            }
        })?;
        rows.push(AggregateRow {
            client_name: exported.client_name,
            client_code: exported.client_code,
            route: exported.pg_pay_mode,
            payment_mode: exported.payment_mode,
            success_count: exported.success_count,
            failed_count: exported.failed_count,
            total: exported.total,
            success_rate,
            health_tier: exported.health_tier,
        });
    }
    Ok(rows)
}

/// Download name for the export of the given batches, e.g. `PIPE_Analysis_(2024-01-01).csv`.
pub fn download_name(batch_ids: &[String]) -> String {
    format!("PIPE_Analysis_({}).csv", batch_ids.join("-"))
}

#[cfg(test)]
use crate::aggregate::RowKey;
#[cfg(test)]
use rust_decimal_macros::dec;

#[cfg(test)]
fn classified(name: &str, code: &str, success: u64, failed: u64) -> AggregateRow {
    let mut row = AggregateRow::new(
        RowKey {
            client_name: name.to_string(),
            client_code: code.to_string(),
            route: "BOB".to_string(),
            payment_mode: "UPI".to_string(),
        },
        success,
        failed,
    );
    row.health_tier = Some(HealthTier::Critical);
    row
}

#[test]
fn header_and_column_order() {
    let output = to_csv_bytes(&[classified("Acme", "C1", 1, 1)]).unwrap();
    assert_eq!(
        output,
        b"client_name,client_code,pg_pay_mode,payment_mode,success_count,failed_count,total,success_rate,health_tier\nAcme,C1,BOB,UPI,1,1,2,50.00,Critical\n"
    );
}

#[test]
fn unclassified_rows_omit_tier() {
    let mut row = classified("Acme", "C1", 3, 0);
    row.health_tier = None;
    let output = to_csv_bytes(&[row]).unwrap();
    assert_eq!(
        output,
        b"client_name,client_code,pg_pay_mode,payment_mode,success_count,failed_count,total,success_rate\nAcme,C1,BOB,UPI,3,0,3,100.00\n"
    );
}

#[test]
fn empty_view_still_has_header() {
    let output = to_csv_bytes(&[]).unwrap();
    assert_eq!(
        output,
        b"client_name,client_code,pg_pay_mode,payment_mode,success_count,failed_count,total,success_rate\n"
    );
}

#[test]
fn quoting_survives_reparse() {
    let rows = vec![
        classified("Acme, Inc.", "C1", 2, 1),
        classified("Say \"hi\"", "C2", 0, 4),
    ];
    let output = to_csv_bytes(&rows).unwrap();
    let parsed = read_summary(output.as_slice()).unwrap();
    assert_eq!(parsed, rows);
    assert_eq!(parsed[0].success_rate, dec!(66.67));
}

#[test]
fn bad_rate_is_reported() {
    let data = "client_name,client_code,pg_pay_mode,payment_mode,success_count,failed_count,total,success_rate\nA,C1,BOB,UPI,1,0,1,lots\n";
    let err = read_summary(data.as_bytes()).unwrap_err();
    assert!(matches!(err, AnalysisError::InvalidField { ref field, .. } if field == "success_rate"));
}

#[test]
fn download_name_joins_batches() {
    let ids = vec!["2024-01-01".to_string(), "2024-01-02".to_string()];
    assert_eq!(download_name(&ids), "PIPE_Analysis_(2024-01-01-2024-01-02).csv");
}
