//! Risk gate: sentiment score in, market filter and position sizing out.
//!
//! The fusion engine depends only on the `RiskGate` trait. `TieredRiskGate`
//! is the shipped implementation and reads its bands from configuration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use shortline_common::{RiskConfig, RiskTier};

/// Output of a risk gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskVerdict {
    /// Whether new short-term positions are allowed at all
    pub market_filter: bool,
    /// Maximum position as a fraction of capital (0-1)
    pub max_position: f64,
    /// Stop loss in percent (negative)
    pub stop_loss: f64,
    /// Take profit in percent (positive)
    pub take_profit: f64,
    pub risk_note: String,
}

impl From<&RiskTier> for RiskVerdict {
    fn from(tier: &RiskTier) -> Self {
        Self {
            market_filter: tier.market_filter,
            max_position: tier.max_position.clamp(0.0, 1.0),
            stop_loss: tier.stop_loss,
            take_profit: tier.take_profit,
            risk_note: tier.risk_note.clone(),
        }
    }
}

/// Maps a market sentiment score to a trading verdict.
pub trait RiskGate: Send + Sync {
    fn evaluate(&self, sentiment_score: f64) -> RiskVerdict;
}

// ============================================================================
// Tiered Risk Gate
// ============================================================================

/// Risk gate backed by a table of score bands.
#[derive(Debug, Clone)]
pub struct TieredRiskGate {
    /// Sorted by `min_score` descending
    tiers: Vec<RiskTier>,
}

impl TieredRiskGate {
    pub fn new(config: &RiskConfig) -> Self {
        let mut tiers = config.tiers.clone();
        tiers.sort_by(|a, b| b.min_score.total_cmp(&a.min_score));
        Self { tiers }
    }

    /// Verdict served when no band covers the score: stay flat.
    fn closed() -> RiskVerdict {
        RiskVerdict {
            market_filter: false,
            max_position: 0.0,
            stop_loss: -6.0,
            take_profit: 12.0,
            risk_note: "无匹配风控档位，空仓观望".to_string(),
        }
    }
}

impl Default for TieredRiskGate {
    fn default() -> Self {
        Self::new(&RiskConfig::default())
    }
}

impl RiskGate for TieredRiskGate {
    fn evaluate(&self, sentiment_score: f64) -> RiskVerdict {
        let verdict = self
            .tiers
            .iter()
            .find(|tier| sentiment_score >= tier.min_score)
            .map(RiskVerdict::from)
            .unwrap_or_else(Self::closed);

        debug!(
            sentiment_score,
            market_filter = verdict.market_filter,
            max_position = verdict.max_position,
            "Risk gate evaluated"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        let gate = TieredRiskGate::default();

        let strong = gate.evaluate(82.0);
        assert!(strong.market_filter);
        assert_eq!(strong.max_position, 0.3);

        let neutral = gate.evaluate(50.0);
        assert!(neutral.market_filter);
        assert_eq!(neutral.max_position, 0.2);

        let weak = gate.evaluate(49.99);
        assert!(!weak.market_filter);
        assert_eq!(weak.max_position, 0.0);
    }

    #[test]
    fn test_unsorted_config_is_sorted() {
        let mut config = RiskConfig::default();
        config.tiers.reverse();
        let gate = TieredRiskGate::new(&config);
        assert_eq!(gate.evaluate(75.0).max_position, 0.3);
    }

    #[test]
    fn test_no_covering_band_closes_market() {
        let config = RiskConfig {
            tiers: vec![RiskTier {
                min_score: 60.0,
                market_filter: true,
                max_position: 1.5,
                stop_loss: -5.0,
                take_profit: 10.0,
                risk_note: "x".into(),
            }],
        };
        let gate = TieredRiskGate::new(&config);
        assert!(!gate.evaluate(10.0).market_filter);
        assert!(!gate.evaluate(f64::NAN).market_filter);
        // sizing is clamped to the full account
        assert_eq!(gate.evaluate(90.0).max_position, 1.0);
    }
}
