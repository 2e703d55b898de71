//! Capital flow analyzer.
//!
//! Combines the northbound (cross-border) net-flow series with the main-force
//! net flow of one instrument, or a market-wide proxy when no instrument is
//! given, into a `CapitalFlowSnapshot`.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{fetch_rows, first_non_empty, FundFlowWindow, MarketDataProvider, NorthboundSource, Provenance, Row};
use crate::debug::{CallContext, DebugTrace};
use crate::normalize::{bare_code, fields, resolve_number, resolve_text};
use crate::DataSource;

/// Points of the northbound series kept after zero-dropping.
pub const SERIES_WINDOW: usize = 20;

/// Market-wide main flow proxy as a share of the northbound net.
pub const MARKET_FLOW_PROXY: f64 = 0.55;

/// Calendar days of per-instrument flow history requested.
pub const FLOW_HISTORY_DAYS: i64 = 10;

/// Symbol reported for the market-wide snapshot.
pub const MARKET_SYMBOL: &str = "market";

/// Inputs of the static fallback snapshot.
pub mod fallback {
    pub const MAIN_FLOW: i64 = 180_000_000;
    pub const NORTHBOUND_NET: i64 = 530_000_000;
    pub const INFLOW_DAYS: u32 = 3;
    pub const STRENGTH_RANK: u32 = 12;
}

// ============================================================================
// Snapshot
// ============================================================================

/// Capital flow picture for one instrument or the whole market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalFlowSnapshot {
    /// Instrument code or `"market"`
    pub symbol: String,
    /// Main-force net flow (signed)
    pub main_flow: i64,
    /// Latest northbound net flow (signed)
    pub northbound_net: i64,
    /// Trailing consecutive positive northbound days
    pub northbound_inflow_days: u32,
    /// `"{n}-day-inflow"` or `"outflow"`
    pub flow_trend: String,
    /// Categorical tier: 5, 12, 30 or 70
    pub strength_rank: u32,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugTrace>,
}

// ============================================================================
// Series Helpers
// ============================================================================

/// Net values of a northbound series, zeros dropped, last 20 kept.
pub fn parse_series(source: NorthboundSource, rows: &[Row]) -> Vec<f64> {
    let keys = if source.is_historical() {
        fields::NORTHBOUND_HIST_NET
    } else {
        fields::NORTHBOUND_NET
    };
    let values: Vec<f64> = rows
        .iter()
        .map(|row| resolve_number(row, keys, 0.0))
        .filter(|v| *v != 0.0)
        .collect();
    let skip = values.len().saturating_sub(SERIES_WINDOW);
    values[skip..].to_vec()
}

/// Trailing run of strictly positive values.
pub fn count_inflow_days(series: &[f64]) -> u32 {
    series.iter().rev().take_while(|v| **v > 0.0).count() as u32
}

/// Categorical tier of a main flow value.
pub fn flow_strength_rank(main_flow: f64) -> u32 {
    if main_flow >= 300_000_000.0 {
        5
    } else if main_flow >= 150_000_000.0 {
        12
    } else if main_flow >= 0.0 {
        30
    } else {
        70
    }
}

/// `"{days}-day-inflow"`, or `"outflow"` when there is no inflow run.
pub fn flow_trend(inflow_days: u32) -> String {
    if inflow_days > 0 {
        format!("{}-day-inflow", inflow_days)
    } else {
        "outflow".to_string()
    }
}

// ============================================================================
// Main Flow Sources
// ============================================================================

/// Where a per-instrument main flow value is read from, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainFlowSource {
    /// Per-instrument daily flow history, latest row
    History,
    /// Ranked snapshot for a window, matching row
    Rank(FundFlowWindow),
}

impl MainFlowSource {
    pub const PRIORITY: [MainFlowSource; 4] = [
        MainFlowSource::History,
        MainFlowSource::Rank(FundFlowWindow::Today),
        MainFlowSource::Rank(FundFlowWindow::FiveDay),
        MainFlowSource::Rank(FundFlowWindow::TenDay),
    ];

    /// Main flow value for `code` in rows fetched from this source.
    fn extract(&self, code: &str, rows: &[Row]) -> Option<f64> {
        match self {
            Self::History => rows
                .last()
                .map(|latest| resolve_number(latest, fields::MAIN_FLOW_HISTORY, 0.0)),
            Self::Rank(_) => rows
                .iter()
                .find(|row| bare_code(&resolve_text(row, fields::CODE, "")) == code)
                .map(|row| resolve_number(row, fields::MAIN_FLOW_RANK, 0.0)),
        }
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Computes `CapitalFlowSnapshot`s.
pub struct CapitalFlowAnalyzer {
    provider: Option<Arc<dyn MarketDataProvider>>,
}

impl CapitalFlowAnalyzer {
    pub fn new(provider: Option<Arc<dyn MarketDataProvider>>) -> Self {
        Self { provider }
    }

    /// Static snapshot served when no northbound series could be read.
    pub fn fallback(ctx: &CallContext, symbol: Option<&str>, trace: DebugTrace) -> CapitalFlowSnapshot {
        CapitalFlowSnapshot {
            symbol: symbol.unwrap_or(MARKET_SYMBOL).to_string(),
            main_flow: fallback::MAIN_FLOW,
            northbound_net: fallback::NORTHBOUND_NET,
            northbound_inflow_days: fallback::INFLOW_DAYS,
            flow_trend: flow_trend(fallback::INFLOW_DAYS),
            strength_rank: fallback::STRENGTH_RANK,
            data_source: DataSource::Fallback,
            debug_info: ctx.attach(trace),
        }
    }

    async fn main_flow_for(
        provider: &dyn MarketDataProvider,
        ctx: &CallContext,
        code: &str,
        trace: &mut DebugTrace,
    ) -> f64 {
        let end = ctx.trade_date;
        let start = end - Duration::days(FLOW_HISTORY_DAYS);

        let found = first_non_empty(
            &MainFlowSource::PRIORITY,
            trace,
            |source| {
                let (provenance, request) = match *source {
                    MainFlowSource::History => (
                        Provenance::with_param("individual_fund_flow", code),
                        provider.individual_fund_flow(code, start, end),
                    ),
                    MainFlowSource::Rank(window) => (
                        Provenance::with_param("fund_flow_rank", window.label()),
                        provider.fund_flow_rank(window),
                    ),
                };
                fetch_rows(provenance, request)
            },
            |source, outcome| source.extract(code, &outcome.rows),
        )
        .await;

        found.map(|(_, value)| value).unwrap_or(0.0)
    }

    /// Analyze flow for `symbol`, or the whole market when `None`.
    pub async fn analyze(&self, ctx: &CallContext, symbol: Option<&str>) -> CapitalFlowSnapshot {
        let symbol = symbol.map(bare_code).filter(|s| !s.is_empty());

        let mut trace = DebugTrace::new("capital_flow");
        trace.input("symbol", symbol.unwrap_or(MARKET_SYMBOL));

        let Some(provider) = self.provider.as_deref() else {
            trace.fallback("provider_unavailable");
            warn!("No market data provider, serving fallback capital flow");
            return Self::fallback(ctx, symbol, trace);
        };
        trace.provider(provider.name());

        let series = first_non_empty(
            &NorthboundSource::PRIORITY,
            &mut trace,
            |source| {
                fetch_rows(
                    Provenance::with_param("northbound_flow", source.label()),
                    provider.northbound_flow(*source),
                )
            },
            |source, outcome| {
                let series = parse_series(*source, &outcome.rows);
                (!series.is_empty()).then_some(series)
            },
        )
        .await;

        let Some((source, series)) = series else {
            trace.fallback("northbound_series_empty");
            warn!("Northbound series empty on every source, serving fallback capital flow");
            return Self::fallback(ctx, symbol, trace);
        };

        let northbound_net = series.last().copied().unwrap_or(0.0);
        let inflow_days = count_inflow_days(&series);

        let main_flow = match symbol {
            Some(code) => Self::main_flow_for(provider, ctx, code, &mut trace).await,
            None => northbound_net * MARKET_FLOW_PROXY,
        };
        let strength_rank = flow_strength_rank(main_flow);

        trace.derive("northbound_source", source.label());
        trace.derive("north_series_points", series.len());

        info!(
            symbol = symbol.unwrap_or(MARKET_SYMBOL),
            main_flow,
            northbound_net,
            inflow_days,
            strength_rank,
            "Capital flow analyzed"
        );

        CapitalFlowSnapshot {
            symbol: symbol.unwrap_or(MARKET_SYMBOL).to_string(),
            main_flow: main_flow as i64,
            northbound_net: northbound_net as i64,
            northbound_inflow_days: inflow_days,
            flow_trend: flow_trend(inflow_days),
            strength_rank,
            data_source: DataSource::Live,
            debug_info: ctx.attach(trace),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<serde_json::Value>) -> Vec<Row> {
        values.into_iter().map(|v| v.as_object().cloned().unwrap()).collect()
    }

    #[test]
    fn test_parse_series_drops_zeros_and_keeps_tail() {
        let direct = rows(
            (0..30)
                .map(|i| {
                    let v = if i % 10 == 0 { 0 } else { i };
                    json!({ "value": v })
                })
                .collect(),
        );
        let series = parse_series(NorthboundSource::Direct, &direct);
        assert_eq!(series.len(), SERIES_WINDOW);
        assert_eq!(series.last(), Some(&29.0));
        assert!(series.iter().all(|v| *v != 0.0));
    }

    #[test]
    fn test_parse_series_uses_source_columns() {
        let hist = rows(vec![json!({"当日成交净买额": "1.5亿", "value": 9})]);
        assert_eq!(parse_series(NorthboundSource::HistoryNorthbound, &hist), vec![150_000_000.0]);
        assert_eq!(parse_series(NorthboundSource::Direct, &hist), vec![9.0]);
    }

    #[test]
    fn test_inflow_days() {
        assert_eq!(count_inflow_days(&[1.0, -2.0, 3.0, 4.0]), 2);
        assert_eq!(count_inflow_days(&[5.0, 6.0, -1.0]), 0);
        assert_eq!(count_inflow_days(&[]), 0);
        let all_positive = [1.0, 2.0, 3.0];
        assert!(count_inflow_days(&all_positive) as usize <= all_positive.len());
    }

    #[test]
    fn test_strength_tiers() {
        assert_eq!(flow_strength_rank(550_000_000.0), 5);
        assert_eq!(flow_strength_rank(300_000_000.0), 5);
        assert_eq!(flow_strength_rank(150_000_000.0), 12);
        assert_eq!(flow_strength_rank(0.0), 30);
        assert_eq!(flow_strength_rank(-1.0), 70);
    }

    #[test]
    fn test_flow_trend_text() {
        assert_eq!(flow_trend(4), "4-day-inflow");
        assert_eq!(flow_trend(0), "outflow");
    }

    #[test]
    fn test_main_flow_extraction() {
        let history = rows(vec![
            json!({"主力净流入-净额": "1000"}),
            json!({"主力净流入-净额": "-2.5亿"}),
        ]);
        assert_eq!(MainFlowSource::History.extract("000001", &history), Some(-250_000_000.0));
        assert_eq!(MainFlowSource::History.extract("000001", &[]), None);

        let rank = rows(vec![
            json!({"代码": "600000", "今日主力净流入-净额": 1.0}),
            json!({"代码": "000001", "今日主力净流入-净额": "3.2亿"}),
        ]);
        let today = MainFlowSource::Rank(FundFlowWindow::Today);
        assert_eq!(today.extract("000001", &rank), Some(320_000_000.0));
        assert_eq!(today.extract("300750", &rank), None);
    }

    #[test]
    fn test_fallback_snapshot() {
        let ctx = CallContext::new(chrono::NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(), false);
        let snapshot = CapitalFlowAnalyzer::fallback(&ctx, None, DebugTrace::new("capital_flow"));
        assert_eq!(snapshot.symbol, "market");
        assert_eq!(snapshot.flow_trend, "3-day-inflow");
        assert_eq!(snapshot.strength_rank, 12);
        assert_eq!(snapshot.main_flow, 180_000_000);
    }
}
