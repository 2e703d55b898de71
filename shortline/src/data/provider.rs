//! Market data provider abstraction.
//!
//! Defines the `MarketDataProvider` trait every upstream source implements.
//! Providers hand back loosely-typed rows; the scorers normalise them.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::Row;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),
    /// Upstream answered with a non-success HTTP status
    #[error("HTTP {0}")]
    Http(u16),
    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
    /// Upstream reported an application-level error code
    #[error("Upstream error: {0}")]
    Upstream(String),
    /// The provider does not offer this endpoint
    #[error("Endpoint not supported: {0}")]
    Unsupported(&'static str),
    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Check if the error is transient (worth trying again later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http(status) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

// ============================================================================
// Endpoint Selectors
// ============================================================================

/// Board family used for sector snapshots and constituent lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    /// 行业板块
    Industry,
    /// 概念板块
    Concept,
}

impl BoardKind {
    /// Primary board family first, then the alternative.
    pub const PRIORITY: [BoardKind; 2] = [BoardKind::Industry, BoardKind::Concept];
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Industry => write!(f, "industry"),
            Self::Concept => write!(f, "concept"),
        }
    }
}

/// Source of the cross-border (northbound) net-flow series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NorthboundSource {
    /// Direct daily net-inflow endpoint
    Direct,
    /// Historical statistics, aggregate northbound label
    HistoryNorthbound,
    /// Historical statistics, Shanghai connect label
    HistoryShanghai,
    /// Historical statistics, Shenzhen connect label
    HistoryShenzhen,
}

impl NorthboundSource {
    /// Priority order: direct endpoint, then the historical labels.
    pub const PRIORITY: [NorthboundSource; 4] = [
        NorthboundSource::Direct,
        NorthboundSource::HistoryNorthbound,
        NorthboundSource::HistoryShanghai,
        NorthboundSource::HistoryShenzhen,
    ];

    /// Upstream label for this series
    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct => "北上",
            Self::HistoryNorthbound => "北向资金",
            Self::HistoryShanghai => "沪股通",
            Self::HistoryShenzhen => "深股通",
        }
    }

    /// Whether rows come from the historical statistics table
    pub fn is_historical(&self) -> bool {
        !matches!(self, Self::Direct)
    }
}

impl fmt::Display for NorthboundSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Window of the ranked fund-flow snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundFlowWindow {
    Today,
    FiveDay,
    TenDay,
}

impl FundFlowWindow {
    /// Windows in the order they are tried.
    pub const PRIORITY: [FundFlowWindow; 3] = [
        FundFlowWindow::Today,
        FundFlowWindow::FiveDay,
        FundFlowWindow::TenDay,
    ];

    /// Upstream label for this window
    pub fn label(&self) -> &'static str {
        match self {
            Self::Today => "今日",
            Self::FiveDay => "5日",
            Self::TenDay => "10日",
        }
    }
}

impl fmt::Display for FundFlowWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Market Data Provider Trait
// ============================================================================

/// Trait for A-share market data providers.
///
/// Every call is one bounded request. An empty `Vec` and an `Err` are
/// treated identically by the scorers; the error only feeds diagnostics.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name (e.g., "eastmoney")
    fn name(&self) -> &'static str;

    /// Daily limit-up pool for a trade date.
    async fn limit_up_pool(&self, date: NaiveDate) -> Result<Vec<Row>, ProviderError>;

    /// Daily limit-down pool for a trade date.
    async fn limit_down_pool(&self, date: NaiveDate) -> Result<Vec<Row>, ProviderError>;

    /// Broken-board pool (limit-up touched but not held) for a trade date.
    ///
    /// Optional; providers without it keep the default.
    async fn broken_board_pool(&self, _date: NaiveDate) -> Result<Vec<Row>, ProviderError> {
        Err(ProviderError::Unsupported("broken_board_pool"))
    }

    /// Full-market spot snapshot.
    async fn spot_snapshot(&self) -> Result<Vec<Row>, ProviderError>;

    /// Industry sector snapshot.
    async fn industry_sectors(&self) -> Result<Vec<Row>, ProviderError>;

    /// Concept sector snapshot.
    async fn concept_sectors(&self) -> Result<Vec<Row>, ProviderError> {
        Err(ProviderError::Unsupported("concept_sectors"))
    }

    /// Constituent rows of a sector, looked up by name or board code.
    async fn sector_constituents(
        &self,
        board: &str,
        kind: BoardKind,
    ) -> Result<Vec<Row>, ProviderError>;

    /// Forward-adjusted daily OHLCV history, oldest first.
    async fn daily_history(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>, ProviderError>;

    /// Cross-border net-flow series, oldest first.
    async fn northbound_flow(&self, source: NorthboundSource) -> Result<Vec<Row>, ProviderError>;

    /// Per-instrument daily fund-flow history, oldest first.
    async fn individual_fund_flow(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>, ProviderError>;

    /// Ranked fund-flow snapshot for a window.
    async fn fund_flow_rank(&self, window: FundFlowWindow) -> Result<Vec<Row>, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("timeout".into()).is_recoverable());
        assert!(ProviderError::Http(503).is_recoverable());
        assert!(ProviderError::Http(429).is_recoverable());
        assert!(!ProviderError::Http(404).is_recoverable());
        assert!(!ProviderError::Parse("bad json".into()).is_recoverable());
        assert!(!ProviderError::Unsupported("concept_sectors").is_recoverable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Http(502);
        assert_eq!(err.to_string(), "HTTP 502");

        let err = ProviderError::Network("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_northbound_priority_order() {
        let labels: Vec<_> = NorthboundSource::PRIORITY.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["北上", "北向资金", "沪股通", "深股通"]);
        assert!(!NorthboundSource::Direct.is_historical());
        assert!(NorthboundSource::HistoryShenzhen.is_historical());
    }

    #[test]
    fn test_fund_flow_window_labels() {
        let labels: Vec<_> = FundFlowWindow::PRIORITY.iter().map(|w| w.to_string()).collect();
        assert_eq!(labels, vec!["今日", "5日", "10日"]);
    }

    #[test]
    fn test_board_kind_priority() {
        assert_eq!(BoardKind::PRIORITY[0], BoardKind::Industry);
        assert_eq!(BoardKind::Concept.to_string(), "concept");
    }
}
