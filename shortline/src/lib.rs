//! Shortline Library
//!
//! A short-term A-share decision engine. Four scorers read public market
//! data and a fusion engine combines them into a single trading signal.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       shortline (CLI / :4440)                       │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐           │
//! │  │  Sentiment    │  │  Sector       │  │  Capital      │           │
//! │  │  Scorer       │  │  Rotation     │  │  Flow         │           │
//! │  └───────┬───────┘  └───────┬───────┘  └───────┬───────┘           │
//! │          │          ┌───────┴───────┐          │                   │
//! │          │          │ Stock Scanner │          │                   │
//! │          │          └───────┬───────┘          │                   │
//! │  ┌───────┴──────────────────┴──────────────────┴───────┐           │
//! │  │         Signal Fusion Engine  +  Risk Gate          │           │
//! │  └─────────────────────────────────────────────────────┘           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Degradation
//!
//! Every scoring operation is infallible. When the market data provider is
//! missing, fails, or returns nothing usable, the scorer serves a static
//! snapshot tagged `data_source = "fallback"`, and the reason is recorded
//! in `debug_info` when diagnostics are requested.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod capital_flow;
pub mod data;
pub mod debug;
pub mod fusion;
pub mod normalize;
pub mod report;
pub mod risk;
pub mod routes;
pub mod scanner;
pub mod sector;
pub mod sentiment;

use anyhow::Result;
use axum::{routing::get, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use shortline_common::Config;

use crate::capital_flow::{CapitalFlowAnalyzer, CapitalFlowSnapshot};
use crate::data::{EastmoneyProvider, MarketDataProvider};
use crate::debug::CallContext;
use crate::fusion::{FusedSignal, SignalFusionEngine};
use crate::report::DailyReport;
use crate::risk::{RiskGate, RiskVerdict, TieredRiskGate};
use crate::scanner::{ScanResult, StockScanner};
use crate::sector::{SectorRotation, SectorRotationScorer};
use crate::sentiment::{MarketSentimentScorer, MarketSentimentSnapshot};

/// Where a payload's numbers came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Computed from provider data
    Live,
    /// Static placeholder served because live data was unusable
    Fallback,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

// ============================================================================
// Toolkit
// ============================================================================

/// Entry point for every decision operation.
///
/// Holds the provider and risk gate; scorers are cheap and built per call.
pub struct ShortlineToolkit {
    config: Config,
    provider: Option<Arc<dyn MarketDataProvider>>,
    risk: Arc<dyn RiskGate>,
    trade_date: Option<NaiveDate>,
}

impl ShortlineToolkit {
    /// Build the toolkit from configuration.
    ///
    /// The eastmoney provider is constructed only when `provider.enabled`.
    pub fn new(config: Config) -> Self {
        let provider = config.provider.enabled.then(|| {
            Arc::new(EastmoneyProvider::new(&config.provider)) as Arc<dyn MarketDataProvider>
        });
        let risk: Arc<dyn RiskGate> = Arc::new(TieredRiskGate::new(&config.risk));

        Self {
            config,
            provider,
            risk,
            trade_date: None,
        }
    }

    /// Replace the market data provider (`None` forces fallback snapshots).
    pub fn with_provider(mut self, provider: Option<Arc<dyn MarketDataProvider>>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_risk_gate(mut self, risk: Arc<dyn RiskGate>) -> Self {
        self.risk = risk;
        self
    }

    /// Pin the logical trading date instead of using today's.
    pub fn with_trade_date(mut self, trade_date: NaiveDate) -> Self {
        self.trade_date = Some(trade_date);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Per-call context; the configured debug default applies when the
    /// caller does not ask for diagnostics.
    pub fn context(&self, debug: bool) -> CallContext {
        let debug = debug || self.config.decision.debug;
        match self.trade_date {
            Some(date) => CallContext::new(date, debug),
            None => CallContext::today(debug),
        }
    }

    pub async fn market_sentiment(&self, debug: bool) -> MarketSentimentSnapshot {
        let ctx = self.context(debug);
        MarketSentimentScorer::new(self.provider.clone())
            .evaluate(&ctx)
            .await
    }

    pub async fn sector_rotation(&self, top_n: Option<usize>, debug: bool) -> SectorRotation {
        let ctx = self.context(debug);
        let top_n = top_n.unwrap_or(self.config.decision.sector_top_n);
        SectorRotationScorer::new(self.provider.clone())
            .evaluate(&ctx, top_n)
            .await
    }

    /// Scan for strong stocks, restricted to `sectors` when given.
    pub async fn scan_strong_stocks(
        &self,
        sectors: Option<&[String]>,
        top_n: Option<usize>,
        debug: bool,
    ) -> ScanResult {
        let ctx = self.context(debug);
        let top_n = top_n.unwrap_or(self.config.decision.scan_top_n);
        StockScanner::new(self.provider.clone())
            .scan(&ctx, sectors, top_n)
            .await
    }

    /// Capital flow for `symbol`, or for the whole market when `None`.
    pub async fn capital_flow(&self, symbol: Option<&str>, debug: bool) -> CapitalFlowSnapshot {
        let ctx = self.context(debug);
        CapitalFlowAnalyzer::new(self.provider.clone())
            .analyze(&ctx, symbol)
            .await
    }

    pub async fn signal(&self, debug: bool) -> FusedSignal {
        let ctx = self.context(debug);
        SignalFusionEngine::new(
            self.provider.clone(),
            Arc::clone(&self.risk),
            &self.config.decision,
        )
        .run(&ctx)
        .await
    }

    pub fn risk_control(&self, sentiment_score: f64) -> RiskVerdict {
        self.risk.evaluate(sentiment_score)
    }

    pub async fn daily_report(&self, debug: bool) -> DailyReport {
        DailyReport::new(self.signal(debug).await)
    }
}

// ============================================================================
// HTTP Service
// ============================================================================

/// HTTP surface over the toolkit.
pub struct ShortlineService {
    toolkit: Arc<ShortlineToolkit>,
}

impl ShortlineService {
    pub fn new(toolkit: ShortlineToolkit) -> Self {
        Self {
            toolkit: Arc::new(toolkit),
        }
    }

    /// Routes served by `start`, exposed for in-process testing.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(routes::health))
            .route("/api/v1/sentiment", get(routes::get_sentiment))
            .route("/api/v1/sectors", get(routes::get_sectors))
            .route("/api/v1/stocks", get(routes::get_stocks))
            .route("/api/v1/capital-flow", get(routes::get_capital_flow))
            .route("/api/v1/signal", get(routes::get_signal))
            .route("/api/v1/risk", get(routes::get_risk))
            .route("/api/v1/report", get(routes::get_report))
            .with_state(self.toolkit.clone())
            .layer(cors)
    }

    /// Bind and serve until the process is interrupted.
    pub async fn start(self) -> Result<()> {
        let server = &self.toolkit.config().server;
        let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
        let app = self.router();

        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                tracing::info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }
}
