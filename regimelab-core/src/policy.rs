//! Strategy policies — which trend series drives entries and how regime
//! labels gate, scale, and force-exit positions.
//!
//! Policies are a closed sum type. The engine matches on the variant; there
//! is no string dispatch and no way to configure a policy the engine does
//! not know about.

use serde::{Deserialize, Serialize};

use crate::domain::{RegimeSnapshot, RiskRegime};
use crate::error::ConfigValidationError;
use crate::risk::RejectReason;

/// Per-regime entry rule: whether entries are allowed at all, and how the
/// position size is scaled when they are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeEntryRule {
    pub allow_entry: bool,
    pub size_multiplier: f64,
}

impl RegimeEntryRule {
    pub const fn new(allow_entry: bool, size_multiplier: f64) -> Self {
        Self {
            allow_entry,
            size_multiplier,
        }
    }
}

/// Regime-conditioned overlay applied on top of the trend signal.
///
/// The regime→action mapping is pure configuration. Nothing here assumes
/// that High regimes are bad for longs; a run can just as well upsize into
/// them by flipping the multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimePolicy {
    pub low: RegimeEntryRule,
    pub medium: RegimeEntryRule,
    pub high: RegimeEntryRule,
    /// Reject entries on bars flagged high-pressure.
    pub block_high_pressure: bool,
    /// Force-exit after this many consecutive High-regime bars while holding.
    pub exit_after_high_bars: Option<usize>,
}

impl Default for RegimePolicy {
    fn default() -> Self {
        Self {
            low: RegimeEntryRule::new(true, 1.0),
            medium: RegimeEntryRule::new(true, 0.7),
            high: RegimeEntryRule::new(true, 0.3),
            block_high_pressure: true,
            exit_after_high_bars: None,
        }
    }
}

impl RegimePolicy {
    pub fn rule_for(&self, regime: RiskRegime) -> &RegimeEntryRule {
        match regime {
            RiskRegime::Low => &self.low,
            RiskRegime::Medium => &self.medium,
            RiskRegime::High => &self.high,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (which, rule) in [
            ("low.size_multiplier", &self.low),
            ("medium.size_multiplier", &self.medium),
            ("high.size_multiplier", &self.high),
        ] {
            if rule.allow_entry && (!rule.size_multiplier.is_finite() || rule.size_multiplier <= 0.0)
            {
                return Err(ConfigValidationError::NonPositive {
                    which,
                    value: rule.size_multiplier,
                });
            }
        }
        if self.exit_after_high_bars == Some(0) {
            return Err(ConfigValidationError::ZeroLimit {
                which: "exit_after_high_bars",
            });
        }
        Ok(())
    }
}

/// Which trend series drives entries, and whether the regime overlay applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyPolicy {
    /// Fine-timeframe ladder states, no regime overlay.
    Baseline,
    /// Fine ladder gated and sized by regime labels.
    RegimeGated {
        #[serde(default)]
        regime: RegimePolicy,
    },
    /// Coarse-timeframe ladder aligned onto fine bars, no overlay.
    MtfDirectional,
    /// Coarse ladder with the regime overlay.
    MtfRegimeGated {
        #[serde(default)]
        regime: RegimePolicy,
    },
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        StrategyPolicy::Baseline
    }
}

impl StrategyPolicy {
    /// Whether the trend series comes from the coarse timeframe.
    pub fn uses_coarse_trend(&self) -> bool {
        matches!(
            self,
            StrategyPolicy::MtfDirectional | StrategyPolicy::MtfRegimeGated { .. }
        )
    }

    pub fn regime_policy(&self) -> Option<&RegimePolicy> {
        match self {
            StrategyPolicy::Baseline | StrategyPolicy::MtfDirectional => None,
            StrategyPolicy::RegimeGated { regime } | StrategyPolicy::MtfRegimeGated { regime } => {
                Some(regime)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        match self.regime_policy() {
            Some(regime) => regime.validate(),
            None => Ok(()),
        }
    }

    /// Gate an entry intent by the bar's regime snapshot. Bars without a
    /// regime label pass ungated.
    pub fn decide_entry(&self, snapshot: Option<&RegimeSnapshot>) -> Result<(), RejectReason> {
        let Some(policy) = self.regime_policy() else {
            return Ok(());
        };
        let Some(snap) = snapshot else {
            return Ok(());
        };
        if policy.block_high_pressure && snap.high_pressure {
            return Err(RejectReason::HighPressure);
        }
        if let Some(regime) = snap.risk_regime {
            if !policy.rule_for(regime).allow_entry {
                return Err(RejectReason::RegimeGate);
            }
        }
        Ok(())
    }

    /// Size multiplier for an approved entry. 1.0 when no overlay applies or
    /// the bar carries no regime label.
    pub fn size_multiplier(&self, snapshot: Option<&RegimeSnapshot>) -> f64 {
        match (self.regime_policy(), snapshot.and_then(|s| s.risk_regime)) {
            (Some(policy), Some(regime)) => policy.rule_for(regime).size_multiplier,
            _ => 1.0,
        }
    }

    /// Whether the dynamic regime exit fires after `consecutive_high_bars`
    /// High-regime bars while holding.
    pub fn decide_exit(&self, consecutive_high_bars: usize) -> bool {
        match self.regime_policy().and_then(|p| p.exit_after_high_bars) {
            Some(threshold) => consecutive_high_bars >= threshold,
            None => false,
        }
    }
}
