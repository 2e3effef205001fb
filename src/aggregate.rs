use std::collections::BTreeMap;

use rust_decimal::prelude::*;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::classify::HealthTier;
use crate::normalize::{NormalizedRecord, StatusBucket};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub client_name: String,
    pub client_code: String,
    pub route: String,
    pub payment_mode: String,
}

impl RowKey {
    fn of(record: &NormalizedRecord) -> Self {
        RowKey {
            client_name: record.client_name.clone(),
            client_code: record.client_code.clone(),
            route: record.route.clone(),
            payment_mode: record.payment_mode.clone(),
        }
    }

    pub fn document_id(&self) -> String {
        format!("{}_{}_{}", self.client_code, self.route, self.payment_mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub client_name: String,
    pub client_code: String,
    pub route: String,
    pub payment_mode: String,
    pub success_count: u64,
    pub failed_count: u64,
    pub total: u64,
    pub success_rate: Decimal,
    pub health_tier: Option<HealthTier>,
}

impl AggregateRow {
    pub fn new(key: RowKey, success_count: u64, failed_count: u64) -> Self {
        let total = success_count + failed_count;
        AggregateRow {
            client_name: key.client_name,
            client_code: key.client_code,
            route: key.route,
            payment_mode: key.payment_mode,
            success_count,
            failed_count,
            total,
            success_rate: percentage(success_count, total),
            health_tier: None,
        }
    }

    pub fn key(&self) -> RowKey {
        RowKey {
            client_name: self.client_name.clone(),
            client_code: self.client_code.clone(),
            route: self.route.clone(),
            payment_mode: self.payment_mode.clone(),
        }
    }
}

impl Serialize for AggregateRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("AggregateRow", 9)?;
        state.serialize_field("client_name", &self.client_name)?;
        state.serialize_field("client_code", &self.client_code)?;
        state.serialize_field("pg_pay_mode", &self.route)?;
        state.serialize_field("payment_mode", &self.payment_mode)?;
        state.serialize_field("success_count", &self.success_count)?;
        state.serialize_field("failed_count", &self.failed_count)?;
        state.serialize_field("total", &self.total)?;
        state.serialize_field("success_rate", &format!("{:.2}", self.success_rate))?;
        match &self.health_tier {
            Some(tier) => state.serialize_field("health_tier", tier)?,
            None => state.skip_field("health_tier")?,
        }
        state.end()
    }
}

/// `round(100 * part / total, 2)`, or zero when there is nothing to divide by.
pub fn percentage(part: u64, total: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
}

/// Rows come out in key order whatever the input order; `Other` records are ignored.
pub fn aggregate(records: &[NormalizedRecord]) -> Vec<AggregateRow> {
    let mut groups: BTreeMap<RowKey, (u64, u64)> = BTreeMap::new();
    for record in records {
        let (success, failed) = match record.status {
            StatusBucket::Success => (1, 0),
            StatusBucket::Failed => (0, 1),
            StatusBucket::Other => continue,
        };
        let counts = groups.entry(RowKey::of(record)).or_default();
        counts.0 += success;
        counts.1 += failed;
    }
    groups
        .into_iter()
        .map(|(key, (success, failed))| AggregateRow::new(key, success, failed))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub success: u64,
    pub failed: u64,
    pub total: u64,
    pub success_pct: Decimal,
    pub failed_pct: Decimal,
}

impl Totals {
    pub fn from_records(records: &[NormalizedRecord]) -> Self {
        let success = records
            .iter()
            .filter(|r| r.status == StatusBucket::Success)
            .count() as u64;
        let failed = records
            .iter()
            .filter(|r| r.status == StatusBucket::Failed)
            .count() as u64;
        let total = success + failed;
        Totals {
            success,
            failed,
            total,
            success_pct: percentage(success, total),
            failed_pct: percentage(failed, total),
        }
    }
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[cfg(test)]
fn record(code: &str, route: &str, mode: &str, status: StatusBucket) -> NormalizedRecord {
    NormalizedRecord {
        client_name: "Unknown".to_string(),
        client_code: code.to_string(),
        route: route.to_string(),
        payment_mode: mode.to_string(),
        status,
        batch: "2024-01-01".to_string(),
    }
}

#[test]
fn counts_and_rate() {
    let records = vec![
        record("C1", "BOB", "UPI", StatusBucket::Success),
        record("C1", "BOB", "UPI", StatusBucket::Failed),
        record("C1", "BOB", "UPI", StatusBucket::Other),
        record("C1", "BOB", "UPI", StatusBucket::Success),
        record("C2", "HDFC", "CARD", StatusBucket::Failed),
    ];
    let rows = aggregate(&records);
    assert_eq!(rows.len(), 2);
    let c1 = &rows[0];
    assert_eq!(c1.client_code, "C1");
    assert_eq!((c1.success_count, c1.failed_count, c1.total), (2, 1, 3));
    assert_eq!(c1.success_rate, dec!(66.67));
    assert_eq!(c1.health_tier, None);
    let c2 = &rows[1];
    assert_eq!((c2.success_count, c2.failed_count, c2.total), (0, 1, 1));
    assert_eq!(c2.success_rate, dec!(0));
}

#[test]
fn other_only_groups_do_not_appear() {
    let records = vec![
        record("C1", "BOB", "UPI", StatusBucket::Other),
        record("C2", "BOB", "UPI", StatusBucket::Success),
    ];
    let rows = aggregate(&records);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].client_code, "C2");
    assert!(aggregate(&[]).is_empty());
}

#[test]
fn order_independent() {
    let mut records = vec![
        record("C1", "BOB", "UPI", StatusBucket::Success),
        record("C2", "BOB", "UPI", StatusBucket::Failed),
        record("C1", "BOB", "UPI", StatusBucket::Failed),
        record("C1", "HDFC", "UPI", StatusBucket::Success),
        record("C2", "BOB", "UPI", StatusBucket::Success),
    ];
    let forward = aggregate(&records);
    records.reverse();
    assert_eq!(aggregate(&records), forward);
    records.rotate_left(2);
    assert_eq!(aggregate(&records), forward);
}

#[test]
fn row_invariants() {
    let records: Vec<NormalizedRecord> = (0..37)
        .map(|i| {
            let status = if i % 3 == 0 { StatusBucket::Failed } else { StatusBucket::Success };
            record(&format!("C{}", i % 4), "BOB", "UPI", status)
        })
        .collect();
    for row in aggregate(&records) {
        assert_eq!(row.success_count + row.failed_count, row.total);
        assert!(row.total > 0);
        assert!(row.success_rate >= Decimal::ZERO && row.success_rate <= Decimal::ONE_HUNDRED);
    }
}

#[test]
fn totals_over_records() {
    let records = vec![
        record("C1", "BOB", "UPI", StatusBucket::Success),
        record("C1", "BOB", "UPI", StatusBucket::Success),
        record("C1", "BOB", "UPI", StatusBucket::Failed),
        record("C1", "BOB", "UPI", StatusBucket::Other),
    ];
    let totals = Totals::from_records(&records);
    assert_eq!((totals.success, totals.failed, totals.total), (2, 1, 3));
    assert_eq!(totals.success_pct, dec!(66.67));
    assert_eq!(totals.failed_pct, dec!(33.33));
    assert_eq!(Totals::from_records(&[]).success_pct, Decimal::ZERO);
}

#[test]
fn document_id_joins_code_route_mode() {
    let row = AggregateRow::new(
        RowKey {
            client_name: "Acme".into(),
            client_code: "C1".into(),
            route: "BOB".into(),
            payment_mode: "UPI".into(),
        },
        1,
        0,
    );
    assert_eq!(row.key().document_id(), "C1_BOB_UPI");
    assert_eq!(row.success_rate, dec!(100));
}
