use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct Thresholds {
    pub healthy_min: Decimal,
    pub warning_min: Decimal,
}

/// On-disk form of [`Thresholds`]: a preset, explicit bounds, or both.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawThresholds {
    policy: Option<Policy>,
    healthy_min: Option<Decimal>,
    warning_min: Option<Decimal>,
}

impl Thresholds {
    pub fn new(healthy_min: Decimal, warning_min: Decimal) -> Result<Self> {
        let hundred = Decimal::ONE_HUNDRED;
        if warning_min < Decimal::ZERO || healthy_min > hundred || warning_min > healthy_min {
            return Err(AnalysisError::Config(format!(
                "thresholds must satisfy 0 <= warning_min ({}) <= healthy_min ({}) <= 100",
                warning_min, healthy_min
            )));
        }
        Ok(Thresholds {
            healthy_min,
            warning_min,
        })
    }

    pub fn policy_a() -> Self {
        Thresholds {
            healthy_min: Decimal::from(90),
            warning_min: Decimal::from(70),
        }
    }

    pub fn policy_b() -> Self {
        Thresholds {
            healthy_min: Decimal::from(95),
            warning_min: Decimal::from(80),
        }
    }

    pub fn from_policy(policy: Policy) -> Self {
        match policy {
            Policy::A => Thresholds::policy_a(),
            Policy::B => Thresholds::policy_b(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds::policy_a()
    }
}

impl TryFrom<RawThresholds> for Thresholds {
    type Error = String;

    fn try_from(raw: RawThresholds) -> std::result::Result<Self, Self::Error> {
        // explicit numbers override the named preset field by field
        let base = raw.policy.map(Thresholds::from_policy).unwrap_or_default();
        Thresholds::new(
            raw.healthy_min.unwrap_or(base.healthy_min),
            raw.warning_min.unwrap_or(base.warning_min),
        )
        .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub data_dir: PathBuf,
    pub object_prefix: String,
    pub collection: String,
    pub thresholds: Thresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            data_dir: PathBuf::from("data"),
            object_prefix: "pipe_data/".to_string(),
            collection: "pipe_summary".to_string(),
            thresholds: Thresholds::default(),
        }
    }
}

impl AnalysisConfig {
    /// Reads the TOML file at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("config file {} not found, using defaults", path.display());
            return Ok(AnalysisConfig::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            AnalysisError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        AnalysisConfig::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AnalysisError::Config(e.to_string()))
    }
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[test]
fn defaults_to_policy_a() {
    let config = AnalysisConfig::from_toml_str("").unwrap();
    assert_eq!(config, AnalysisConfig::default());
    assert_eq!(config.thresholds.healthy_min, dec!(90));
    assert_eq!(config.thresholds.warning_min, dec!(70));
}

#[test]
fn named_policy_b() {
    let config = AnalysisConfig::from_toml_str("[thresholds]\npolicy = \"b\"\n").unwrap();
    assert_eq!(config.thresholds, Thresholds::policy_b());
}

#[test]
fn explicit_numbers_override_policy() {
    let toml = "data_dir = \"batches\"\n[thresholds]\npolicy = \"b\"\nwarning_min = 75\n";
    let config = AnalysisConfig::from_toml_str(toml).unwrap();
    assert_eq!(config.data_dir, PathBuf::from("batches"));
    assert_eq!(config.thresholds.healthy_min, dec!(95));
    assert_eq!(config.thresholds.warning_min, dec!(75));
}

#[test]
fn rejects_inverted_thresholds() {
    let toml = "[thresholds]\nhealthy_min = 60\nwarning_min = 70\n";
    let err = AnalysisConfig::from_toml_str(toml).unwrap_err();
    assert!(matches!(err, AnalysisError::Config(_)));
    assert!(Thresholds::new(dec!(101), dec!(70)).is_err());
    assert!(Thresholds::new(dec!(90), dec!(-1)).is_err());
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, AnalysisConfig::default());
}
