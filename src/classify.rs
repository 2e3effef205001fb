use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateRow;
use crate::config::Thresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthTier {
    Healthy,
    Warning,
    Critical,
}

impl HealthTier {
    pub fn for_rate(rate: Decimal, thresholds: &Thresholds) -> Self {
        if rate >= thresholds.healthy_min {
            HealthTier::Healthy
        } else if rate >= thresholds.warning_min {
            HealthTier::Warning
        } else {
            HealthTier::Critical
        }
    }
}

impl fmt::Display for HealthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthTier::Healthy => "Healthy",
            HealthTier::Warning => "Warning",
            HealthTier::Critical => "Critical",
        };
        f.write_str(name)
    }
}

impl FromStr for HealthTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "healthy" => Ok(HealthTier::Healthy),
            "warning" => Ok(HealthTier::Warning),
            "critical" => Ok(HealthTier::Critical),
            other => Err(format!("unknown health tier '{}'", other)),
        }
    }
}

pub fn classify(rows: &[AggregateRow], thresholds: &Thresholds) -> Vec<AggregateRow> {
    rows.iter()
        .map(|row| AggregateRow {
            health_tier: Some(HealthTier::for_rate(row.success_rate, thresholds)),
            ..row.clone()
        })
        .collect()
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[test]
fn policy_a_boundaries() {
    let t = Thresholds::policy_a();
    assert_eq!(HealthTier::for_rate(dec!(100), &t), HealthTier::Healthy);
    assert_eq!(HealthTier::for_rate(dec!(90), &t), HealthTier::Healthy);
    assert_eq!(HealthTier::for_rate(dec!(89.99), &t), HealthTier::Warning);
    assert_eq!(HealthTier::for_rate(dec!(70), &t), HealthTier::Warning);
    assert_eq!(HealthTier::for_rate(dec!(69.99), &t), HealthTier::Critical);
    assert_eq!(HealthTier::for_rate(dec!(0), &t), HealthTier::Critical);
}

#[test]
fn policy_b_boundaries() {
    let t = Thresholds::policy_b();
    assert_eq!(HealthTier::for_rate(dec!(95), &t), HealthTier::Healthy);
    assert_eq!(HealthTier::for_rate(dec!(94.99), &t), HealthTier::Warning);
    assert_eq!(HealthTier::for_rate(dec!(80), &t), HealthTier::Warning);
    assert_eq!(HealthTier::for_rate(dec!(79.99), &t), HealthTier::Critical);
}

#[test]
fn every_rate_has_one_tier() {
    for t in [Thresholds::policy_a(), Thresholds::policy_b()] {
        let mut previous = HealthTier::Critical;
        for hundredths in 0..=10_000i64 {
            let tier = HealthTier::for_rate(Decimal::new(hundredths, 2), &t);
            // tiers only ever improve as the rate grows
            assert!(tier <= previous);
            previous = tier;
        }
        assert_eq!(previous, HealthTier::Healthy);
    }
}

#[test]
fn tier_parses_case_insensitively() {
    assert_eq!("critical".parse::<HealthTier>(), Ok(HealthTier::Critical));
    assert_eq!(" Healthy".parse::<HealthTier>(), Ok(HealthTier::Healthy));
    assert!("green".parse::<HealthTier>().is_err());
    assert_eq!(HealthTier::Warning.to_string(), "Warning");
}
