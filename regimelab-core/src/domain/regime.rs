//! Regime columns — the contract with the external factor/regime classifier.
//!
//! The upstream pipeline computes three risk factors (manipulation score,
//! order-flow imbalance, volume/liquidity stress), their within-instrument
//! quantile scores, a composite risk score, and a discrete risk regime.
//! The core consumes these as an opaque, stable schema and never branches on
//! how they were computed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete risk regime label from the composite risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRegime {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskRegime::Low => f.write_str("low"),
            RiskRegime::Medium => f.write_str("medium"),
            RiskRegime::High => f.write_str("high"),
        }
    }
}

/// Per-bar regime columns supplied by the external classifier.
///
/// All fields are optional except `high_pressure`: the engine runs fine on
/// bare OHLCV, and regime-conditioned aggregation simply reports "unknown"
/// buckets when columns are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    /// Quantile score of the manipulation factor strength, in [0, 1].
    pub q_manip: Option<f64>,
    /// Quantile score of the order-flow imbalance strength, in [0, 1].
    pub q_ofi: Option<f64>,
    /// Quantile score of the volume/liquidity stress factor, in [0, 1].
    pub q_vol: Option<f64>,
    /// Composite risk score, in [0, 1].
    pub risk_score: Option<f64>,
    /// Discrete regime from the composite score.
    pub risk_regime: Option<RiskRegime>,
    /// Flag set upstream when the composite score exceeds the calibrated
    /// high-pressure threshold.
    #[serde(default)]
    pub high_pressure: bool,
    /// Discrete combined factor box, e.g. "M_high_O_low_V_high".
    pub factor_box: Option<String>,
}

impl RegimeSnapshot {
    /// Empty snapshot: no factor columns present.
    pub fn empty() -> Self {
        Self {
            q_manip: None,
            q_ofi: None,
            q_vol: None,
            risk_score: None,
            risk_regime: None,
            high_pressure: false,
            factor_box: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_regime_display() {
        assert_eq!(RiskRegime::Low.to_string(), "low");
        assert_eq!(RiskRegime::High.to_string(), "high");
    }

    #[test]
    fn regime_serde_roundtrip() {
        let snap = RegimeSnapshot {
            q_manip: Some(0.92),
            q_ofi: Some(0.40),
            q_vol: Some(0.77),
            risk_score: Some(0.81),
            risk_regime: Some(RiskRegime::High),
            high_pressure: true,
            factor_box: Some("M_high_O_low_V_high".into()),
        };
        let json = serde_json::to_string(&snap).unwrap();
        let deser: RegimeSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, deser);
    }

    #[test]
    fn risk_regime_lowercase_wire_format() {
        let json = serde_json::to_string(&RiskRegime::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}
