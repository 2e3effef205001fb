//! Success/failure analysis of payment transactions per client and gateway route.

use log::{debug, info};

pub mod aggregate;
pub mod audit;
pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod normalize;
pub mod sync;
pub mod view;

pub use aggregate::{AggregateRow, RowKey, Totals};
pub use batch::{Batch, BatchSource, RawRecord};
pub use classify::HealthTier;
pub use config::{AnalysisConfig, Thresholds};
pub use error::{AnalysisError, EmptyReason, Result};
pub use view::{Session, SortOrder, TierSummary};

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub batch_ids: Vec<String>,
    pub totals: Totals,
    pub rows: Vec<AggregateRow>,
    /// Counts over `rows`, so they do not move while the filter changes.
    pub summary: TierSummary,
    pub view: Vec<AggregateRow>,
}

impl Report {
    pub fn alerts(&self) -> Vec<&AggregateRow> {
        self.rows
            .iter()
            .filter(|row| row.health_tier == Some(HealthTier::Critical))
            .collect()
    }

    pub fn find(&self, key: &RowKey) -> Option<&AggregateRow> {
        self.rows.iter().find(|row| row.key() == *key)
    }

    pub fn find_route(&self, client_code: &str, route: &str, mode: &str) -> Option<&AggregateRow> {
        self.rows.iter().find(|row| {
            row.client_code == client_code && row.route == route && row.payment_mode == mode
        })
    }

    pub fn selected(&self, session: &Session) -> Option<&AggregateRow> {
        session.selected.as_ref().and_then(|key| self.find(key))
    }

    pub fn export_name(&self) -> String {
        export::download_name(&self.batch_ids)
    }
}

pub fn run(batches: &[Batch], config: &AnalysisConfig, session: &Session) -> Result<Report> {
    if batches.is_empty() {
        return Err(AnalysisError::EmptyResult(EmptyReason::NoBatchesLoaded));
    }

    let records = normalize::normalize(batches)?;
    let totals = Totals::from_records(&records);
    if totals.total == 0 {
        info!("{} records loaded, none success or failed", records.len());
        return Err(AnalysisError::EmptyResult(EmptyReason::NoValidTransactions));
    }

    let rows = classify::classify(&aggregate::aggregate(&records), &config.thresholds);
    let summary = TierSummary::from_rows(&rows);
    let view = view::build_view(&rows, session.filter, session.sort);
    debug!(
        "{} groups, {} in view (filter {:?}, sort {:?})",
        rows.len(),
        view.len(),
        session.filter,
        session.sort
    );

    Ok(Report {
        batch_ids: batches.iter().map(|batch| batch.id.clone()).collect(),
        totals,
        rows,
        summary,
        view,
    })
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[cfg(test)]
fn scenario_batch() -> Batch {
    Batch::new(
        "2024-01-01",
        &normalize::REQUIRED_COLUMNS,
        vec![
            RawRecord::new("C1", "BOB", "UPI", "SUCCESS"),
            RawRecord::new("C1", "BOB", "UPI", "Failed - timeout"),
            RawRecord::new("C1", "BOB", "UPI", "pending"),
        ],
    )
}

#[test]
fn single_batch_scenario() {
    let report = run(&[scenario_batch()], &AnalysisConfig::default(), &Session::default()).unwrap();
    assert_eq!(report.rows.len(), 1);
    let row = &report.rows[0];
    assert_eq!(row.client_name, "Unknown");
    assert_eq!((row.success_count, row.failed_count, row.total), (1, 1, 2));
    assert_eq!(row.success_rate, dec!(50.0));
    assert_eq!(row.health_tier, Some(HealthTier::Critical));
    assert_eq!(report.alerts().len(), 1);
    assert_eq!(report.export_name(), "PIPE_Analysis_(2024-01-01).csv");
}

#[test]
fn same_tier_under_policy_b() {
    let config = AnalysisConfig {
        thresholds: Thresholds::policy_b(),
        ..AnalysisConfig::default()
    };
    let report = run(&[scenario_batch()], &config, &Session::default()).unwrap();
    assert_eq!(report.rows[0].health_tier, Some(HealthTier::Critical));
}

#[test]
fn no_batches_is_informational() {
    let err = run(&[], &AnalysisConfig::default(), &Session::default()).unwrap_err();
    assert!(err.is_informational());
}

#[test]
fn only_other_statuses_is_empty() {
    let batch = Batch::new(
        "2024-01-01",
        &normalize::REQUIRED_COLUMNS,
        vec![RawRecord::new("C1", "BOB", "UPI", "pending")],
    );
    let err = run(&[batch], &AnalysisConfig::default(), &Session::default()).unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::EmptyResult(EmptyReason::NoValidTransactions)
    ));
}

#[test]
fn selected_row_survives_reruns() {
    let batches = [scenario_batch()];
    let config = AnalysisConfig::default();
    let session = Session::default()
        .sort_by(SortOrder::Ascending)
        .select_tier(HealthTier::Critical);
    let first = run(&batches, &config, &session).unwrap();
    assert!(first.selected(&session).is_none());

    let key = first.find_route("C1", "BOB", "UPI").unwrap().key();
    let session = session.select_row(key.clone());
    let second = run(&batches, &config, &session).unwrap();
    let row = second.selected(&session).unwrap();
    assert_eq!(row.key(), key);
    assert_eq!(second.find(&key), Some(row));
    assert!(second.find_route("C1", "HDFC", "UPI").is_none());

    let cleared = session.clear_selection();
    assert_eq!(cleared.selected, None);
    assert_eq!(cleared.filter, Some(HealthTier::Critical));
    assert_eq!(cleared.sort, SortOrder::Ascending);
    assert!(second.selected(&cleared).is_none());
}
