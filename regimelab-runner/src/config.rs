//! Serializable run configuration.
//!
//! A `RunConfig` captures everything needed to reproduce a run: universe,
//! timeframes, date window, strategy policy, risk limits, and the stats
//! layer's knobs. `run_id()` content-addresses the config so two identical
//! configs always produce the same artifact prefix.

use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::domain::Timeframe;
use regimelab_core::error::ConfigValidationError;
use regimelab_core::ladder::LadderConfig;
use regimelab_core::policy::StrategyPolicy;
use regimelab_core::risk::RiskConfig;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

/// Errors from loading and validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigValidationError),
}

/// Factor column a decile profile can be keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorColumn {
    QManip,
    QOfi,
    QVol,
    RiskScore,
}

impl fmt::Display for FactorColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorColumn::QManip => f.write_str("q_manip"),
            FactorColumn::QOfi => f.write_str("q_ofi"),
            FactorColumn::QVol => f.write_str("q_vol"),
            FactorColumn::RiskScore => f.write_str("risk_score"),
        }
    }
}

/// Statistics layer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Forward-return horizons (in bars) for the decile profiles.
    pub horizons: Vec<usize>,
    /// Factor columns to profile by decile.
    pub decile_factors: Vec<FactorColumn>,
    /// Minimum trade count for a factor-box row to be reported.
    pub min_trades_per_box: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            horizons: vec![1, 8, 24],
            decile_factors: vec![FactorColumn::RiskScore],
            min_trades_per_box: 5,
        }
    }
}

/// Complete configuration for a single run, loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    /// Coarse timeframe driving MTF policies. Must be coarser than
    /// `timeframe` when set.
    #[serde(default)]
    pub coarse_timeframe: Option<Timeframe>,
    /// Inclusive date window; dates are quoted strings in TOML
    /// ("2024-01-01"). None means unbounded.
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    #[serde(default = "default_initial_equity")]
    pub initial_equity: f64,
    /// Transaction cost per side as a percentage of notional.
    #[serde(default)]
    pub cost_per_side_pct: f64,
    /// One portfolio across all symbols instead of one per symbol.
    #[serde(default)]
    pub shared_portfolio: bool,
    #[serde(default)]
    pub ladder: LadderConfig,
    #[serde(default)]
    pub policy: StrategyPolicy,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

fn default_initial_equity() -> f64 {
    100_000.0
}

impl RunConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_toml_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: RunConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the whole config before any bar is touched.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.symbols.is_empty() {
            return Err(ConfigValidationError::ZeroLimit { which: "symbols" });
        }
        if self.initial_equity <= 0.0 {
            return Err(ConfigValidationError::NonPositive {
                which: "initial_equity",
                value: self.initial_equity,
            });
        }
        if !(0.0..=100.0).contains(&self.cost_per_side_pct) {
            return Err(ConfigValidationError::PercentOutOfRange {
                which: "cost_per_side_pct",
                value: self.cost_per_side_pct,
            });
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(ConfigValidationError::Invalid(format!(
                    "start date {start} is after end date {end}"
                )));
            }
        }
        if self.policy.uses_coarse_trend() {
            match self.coarse_timeframe {
                None => {
                    return Err(ConfigValidationError::Invalid(
                        "coarse_timeframe must be set for MTF policies".to_string(),
                    ));
                }
                Some(coarse) if coarse.minutes() <= self.timeframe.minutes() => {
                    return Err(ConfigValidationError::Invalid(format!(
                        "coarse timeframe {coarse} is not coarser than trading timeframe {}",
                        self.timeframe
                    )));
                }
                Some(_) => {}
            }
        }
        for &h in &self.stats.horizons {
            if h == 0 {
                return Err(ConfigValidationError::ZeroLimit {
                    which: "stats.horizons",
                });
            }
        }
        self.ladder.validate()?;
        self.policy.validate()?;
        self.risk.validate()?;
        Ok(())
    }

    /// Deterministic content hash of this configuration.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
