//! Signal fusion engine.
//!
//! Runs the four scorers, asks the risk gate for a verdict on the sentiment
//! score, and fuses five sub-scores into one graded decision:
//!
//! | Factor | Weight |
//! |--------|--------|
//! | market sentiment | 25% |
//! | sector strength | 25% |
//! | stock volume / strength | 20% |
//! | capital inflow | 20% |
//! | technical structure | 10% |
//!
//! The risk gate can veto a qualifying score down to `NO_TRADE` but never
//! upgrades a low one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use shortline_common::DecisionConfig;

use crate::capital_flow::{CapitalFlowAnalyzer, CapitalFlowSnapshot};
use crate::data::MarketDataProvider;
use crate::debug::{CallContext, DebugTrace};
use crate::normalize::{clamp, round_to};
use crate::risk::{RiskGate, RiskVerdict};
use crate::scanner::{StockCandidate, StockScanner};
use crate::sector::{SectorRotationScorer, SectorStrength};
use crate::sentiment::{MarketSentimentScorer, MarketSentimentSnapshot};
use crate::DataSource;

/// Composite at or above which a short buy is considered
pub const SHORT_BUY_THRESHOLD: f64 = 75.0;
/// Composite at or above which a stock is worth watching
pub const WATCHLIST_THRESHOLD: f64 = 60.0;

// ============================================================================
// Signal Types
// ============================================================================

/// Graded trading decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSignal {
    ShortBuy,
    Watchlist,
    NoTrade,
}

impl TradeSignal {
    /// Suggested holding period in trading days
    pub fn holding_days(&self) -> &'static str {
        match self {
            Self::ShortBuy => "1-3",
            Self::Watchlist => "1-2",
            Self::NoTrade => "0",
        }
    }
}

impl std::fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShortBuy => write!(f, "SHORT_BUY"),
            Self::Watchlist => write!(f, "WATCHLIST"),
            Self::NoTrade => write!(f, "NO_TRADE"),
        }
    }
}

/// The five sub-scores, each 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub market_sentiment: f64,
    pub sector_strength: f64,
    pub stock_volume_strength: f64,
    pub capital_inflow: f64,
    pub technical_structure: f64,
}

impl FactorBreakdown {
    /// Weighted composite, clamped to [0, 100] and rounded to 2 decimals.
    pub fn composite(&self) -> f64 {
        let score = self.market_sentiment * 0.25
            + self.sector_strength * 0.25
            + self.stock_volume_strength * 0.20
            + self.capital_inflow * 0.20
            + self.technical_structure * 0.10;
        round_to(clamp(score, 0.0, 100.0), 2)
    }

    fn rounded(&self) -> Self {
        Self {
            market_sentiment: round_to(self.market_sentiment, 2),
            sector_strength: round_to(self.sector_strength, 2),
            stock_volume_strength: round_to(self.stock_volume_strength, 2),
            capital_inflow: round_to(self.capital_inflow, 2),
            technical_structure: round_to(self.technical_structure, 2),
        }
    }
}

/// Data source of every scorer that fed the signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSources {
    pub market_sentiment: DataSource,
    pub sector_rotation: DataSource,
    pub stock_scan: DataSource,
    pub capital_flow: DataSource,
}

/// Diagnostics attached to a fused signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionDebug {
    pub module: String,
    pub selected_symbol: Option<String>,
    pub sources: SignalSources,
    /// Scorer traces in stage order: sentiment, sectors, scan, capital flow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traces: Vec<DebugTrace>,
}

/// The fused recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSignal {
    /// Composite 0-100
    pub score: f64,
    pub signal: TradeSignal,
    pub holding_days: String,
    /// 0-0.95
    pub confidence: f64,
    pub risk_control: RiskVerdict,
    pub market_sentiment: MarketSentimentSnapshot,
    pub top_sectors: Vec<SectorStrength>,
    pub candidates: Vec<StockCandidate>,
    pub capital_flow: CapitalFlowSnapshot,
    pub factor_breakdown: FactorBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<FusionDebug>,
}

// ============================================================================
// Sub-scores
// ============================================================================

/// Mean strength of the three strongest sectors, 0 when there are none.
pub fn sector_score(top_sectors: &[SectorStrength]) -> f64 {
    let top3 = &top_sectors[..top_sectors.len().min(3)];
    if top3.is_empty() {
        return 0.0;
    }
    top3.iter().map(|s| s.strength).sum::<f64>() / top3.len() as f64
}

/// Volume and change of the top candidate, 0 without one.
pub fn stock_score(top: Option<&StockCandidate>) -> f64 {
    top.map_or(0.0, |c| {
        clamp(c.volume_ratio / 3.0 * 60.0 + c.change_pct / 10.0 * 40.0, 0.0, 100.0)
    })
}

/// Main flow and northbound inflow persistence.
pub fn capital_score(flow: &CapitalFlowSnapshot) -> f64 {
    let score = clamp(flow.main_flow as f64 / 300_000_000.0 * 70.0, 0.0, 70.0)
        + clamp(f64::from(flow.northbound_inflow_days) / 5.0 * 30.0, 0.0, 30.0);
    clamp(score, 0.0, 100.0)
}

/// Technical structure of the top candidate, 0 without one.
pub fn technical_score(top: Option<&StockCandidate>) -> f64 {
    top.map_or(0.0, |c| clamp(55.0 + c.volume_ratio * 10.0, 0.0, 100.0))
}

/// Decision for a composite under the risk gate's market filter.
///
/// Returns the signal and its confidence. First matching rule wins.
pub fn decide(composite: f64, market_filter: bool) -> (TradeSignal, f64) {
    let (signal, confidence) = if composite >= SHORT_BUY_THRESHOLD && market_filter {
        (TradeSignal::ShortBuy, clamp(composite / 100.0 * 0.9, 0.0, 0.95))
    } else if composite >= WATCHLIST_THRESHOLD && market_filter {
        (TradeSignal::Watchlist, clamp(composite / 100.0 * 0.75, 0.0, 0.85))
    } else {
        (TradeSignal::NoTrade, clamp(composite / 100.0 * 0.6, 0.0, 0.7))
    };
    // 2-decimal composites stay distinguishable at 6 decimals
    (signal, round_to(confidence, 6))
}

// ============================================================================
// Engine
// ============================================================================

/// Orchestrates the scorers into a `FusedSignal`.
pub struct SignalFusionEngine {
    sentiment: MarketSentimentScorer,
    sectors: SectorRotationScorer,
    scanner: StockScanner,
    capital: CapitalFlowAnalyzer,
    risk: Arc<dyn RiskGate>,
    sector_top_n: usize,
    candidate_top_n: usize,
}

impl SignalFusionEngine {
    pub fn new(
        provider: Option<Arc<dyn MarketDataProvider>>,
        risk: Arc<dyn RiskGate>,
        decision: &DecisionConfig,
    ) -> Self {
        Self {
            sentiment: MarketSentimentScorer::new(provider.clone()),
            sectors: SectorRotationScorer::new(provider.clone()),
            scanner: StockScanner::new(provider.clone()),
            capital: CapitalFlowAnalyzer::new(provider),
            risk,
            sector_top_n: decision.sector_top_n,
            candidate_top_n: decision.signal_candidates,
        }
    }

    /// Compute one fused signal.
    pub async fn run(&self, ctx: &CallContext) -> FusedSignal {
        // Independent of each other; the scanner needs the sector names
        let (sentiment, rotation) = tokio::join!(
            self.sentiment.evaluate(ctx),
            self.sectors.evaluate(ctx, self.sector_top_n)
        );

        let sector_names = rotation.sector_names();
        let scan = self
            .scanner
            .scan(ctx, Some(sector_names.as_slice()), self.candidate_top_n)
            .await;

        let selected_symbol = scan.top().map(|c| c.code.clone());
        let capital = self.capital.analyze(ctx, selected_symbol.as_deref()).await;

        let risk = self.risk.evaluate(sentiment.market_sentiment_score);

        let factors = FactorBreakdown {
            market_sentiment: sentiment.market_sentiment_score,
            sector_strength: sector_score(&rotation.top_sectors),
            stock_volume_strength: stock_score(scan.top()),
            capital_inflow: capital_score(&capital),
            technical_structure: technical_score(scan.top()),
        };
        let score = factors.composite();
        let (signal, confidence) = decide(score, risk.market_filter);

        info!(
            score,
            signal = %signal,
            confidence,
            market_filter = risk.market_filter,
            symbol = selected_symbol.as_deref().unwrap_or(""),
            "Signal fused"
        );

        let debug_info = ctx.debug.then(|| FusionDebug {
            module: "signal_fusion".to_string(),
            selected_symbol: selected_symbol.clone(),
            sources: SignalSources {
                market_sentiment: sentiment.data_source,
                sector_rotation: rotation.data_source,
                stock_scan: scan.data_source,
                capital_flow: capital.data_source,
            },
            traces: [
                &sentiment.debug_info,
                &rotation.debug_info,
                &scan.debug_info,
                &capital.debug_info,
            ]
            .into_iter()
            .flatten()
            .cloned()
            .collect(),
        });

        FusedSignal {
            score,
            signal,
            holding_days: signal.holding_days().to_string(),
            confidence,
            risk_control: risk,
            market_sentiment: sentiment,
            top_sectors: rotation.top_sectors,
            candidates: scan.candidates,
            capital_flow: capital,
            factor_breakdown: factors.rounded(),
            debug_info,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
