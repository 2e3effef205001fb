use std::str::FromStr;

use crate::aggregate::{AggregateRow, RowKey};
use crate::classify::HealthTier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Unsorted,
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "unsorted" => Ok(SortOrder::Unsorted),
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierSummary {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
}

impl TierSummary {
    pub fn from_rows(rows: &[AggregateRow]) -> Self {
        let mut summary = TierSummary::default();
        for tier in rows.iter().filter_map(|row| row.health_tier) {
            match tier {
                HealthTier::Healthy => summary.healthy += 1,
                HealthTier::Warning => summary.warning += 1,
                HealthTier::Critical => summary.critical += 1,
            }
        }
        summary
    }

    pub fn count(&self, tier: HealthTier) -> usize {
        match tier {
            HealthTier::Healthy => self.healthy,
            HealthTier::Warning => self.warning,
            HealthTier::Critical => self.critical,
        }
    }
}

/// Filters to `filter` (all rows when `None`) then sorts by success rate.
/// The sort is stable, so equal rates keep their incoming order.
pub fn build_view(
    rows: &[AggregateRow],
    filter: Option<HealthTier>,
    sort: SortOrder,
) -> Vec<AggregateRow> {
    let mut view: Vec<AggregateRow> = rows
        .iter()
        .filter(|row| filter.map_or(true, |tier| row.health_tier == Some(tier)))
        .cloned()
        .collect();
    match sort {
        SortOrder::Unsorted => {}
        SortOrder::Ascending => view.sort_by(|a, b| a.success_rate.cmp(&b.success_rate)),
        SortOrder::Descending => view.sort_by(|a, b| b.success_rate.cmp(&a.success_rate)),
    }
    view
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub filter: Option<HealthTier>,
    pub sort: SortOrder,
    pub selected: Option<RowKey>,
}

impl Session {
    pub fn select_tier(&self, tier: HealthTier) -> Session {
        Session {
            filter: Some(tier),
            ..self.clone()
        }
    }

    /// Drops the tier filter; the sort order is kept.
    pub fn refresh(&self) -> Session {
        Session {
            filter: None,
            ..self.clone()
        }
    }

    pub fn sort_by(&self, sort: SortOrder) -> Session {
        Session {
            sort,
            ..self.clone()
        }
    }

    pub fn select_row(&self, key: RowKey) -> Session {
        Session {
            selected: Some(key),
            ..self.clone()
        }
    }

    pub fn clear_selection(&self) -> Session {
        Session {
            selected: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
use rust_decimal::Decimal;

#[cfg(test)]
fn row(code: &str, rate: i64, tier: HealthTier) -> AggregateRow {
    AggregateRow {
        client_name: "Unknown".to_string(),
        client_code: code.to_string(),
        route: "BOB".to_string(),
        payment_mode: "UPI".to_string(),
        success_count: rate as u64,
        failed_count: 100 - rate as u64,
        total: 100,
        success_rate: Decimal::from(rate),
        health_tier: Some(tier),
    }
}

#[cfg(test)]
fn codes(rows: &[AggregateRow]) -> Vec<&str> {
    rows.iter().map(|r| r.client_code.as_str()).collect()
}

#[cfg(test)]
fn sample() -> Vec<AggregateRow> {
    vec![
        row("A", 95, HealthTier::Healthy),
        row("B", 50, HealthTier::Critical),
        row("C", 75, HealthTier::Warning),
        row("D", 20, HealthTier::Critical),
    ]
}

#[test]
fn filter_by_tier() {
    let rows = sample();
    assert_eq!(codes(&build_view(&rows, None, SortOrder::Unsorted)), vec!["A", "B", "C", "D"]);
    assert_eq!(
        codes(&build_view(&rows, Some(HealthTier::Critical), SortOrder::Unsorted)),
        vec!["B", "D"]
    );
    assert!(build_view(&rows[..1], Some(HealthTier::Warning), SortOrder::Unsorted).is_empty());
}

#[test]
fn ascending_and_descending_reverse_without_ties() {
    let rows = sample();
    let asc = build_view(&rows, None, SortOrder::Ascending);
    let mut desc = build_view(&rows, None, SortOrder::Descending);
    assert_eq!(codes(&asc), vec!["D", "B", "C", "A"]);
    desc.reverse();
    assert_eq!(asc, desc);
}

#[test]
fn sort_is_stable_for_ties() {
    let rows = vec![
        row("A", 50, HealthTier::Critical),
        row("B", 80, HealthTier::Warning),
        row("C", 50, HealthTier::Critical),
        row("D", 50, HealthTier::Critical),
    ];
    assert_eq!(codes(&build_view(&rows, None, SortOrder::Ascending)), vec!["A", "C", "D", "B"]);
    assert_eq!(codes(&build_view(&rows, None, SortOrder::Descending)), vec!["B", "A", "C", "D"]);
}

#[test]
fn summary_counts_every_tier() {
    let summary = TierSummary::from_rows(&sample());
    assert_eq!(summary.count(HealthTier::Healthy), 1);
    assert_eq!(summary.count(HealthTier::Warning), 1);
    assert_eq!(summary.count(HealthTier::Critical), 2);
}

#[test]
fn refresh_clears_filter_but_keeps_sort() {
    let session = Session::default()
        .sort_by(SortOrder::Descending)
        .select_tier(HealthTier::Critical);
    assert_eq!(session.filter, Some(HealthTier::Critical));
    let refreshed = session.refresh();
    assert_eq!(refreshed.filter, None);
    assert_eq!(refreshed.sort, SortOrder::Descending);
    // the previous state value is untouched
    assert_eq!(session.filter, Some(HealthTier::Critical));
}

#[test]
fn sort_order_parses() {
    assert_eq!("asc".parse::<SortOrder>(), Ok(SortOrder::Ascending));
    assert_eq!("Descending".parse::<SortOrder>(), Ok(SortOrder::Descending));
    assert_eq!("none".parse::<SortOrder>(), Ok(SortOrder::Unsorted));
    assert!("sideways".parse::<SortOrder>().is_err());
}
