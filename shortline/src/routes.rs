//! HTTP routes for the decision service.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use shortline_common::config::parse_bool_flag;
use shortline_common::Error;

use crate::capital_flow::CapitalFlowSnapshot;
use crate::fusion::FusedSignal;
use crate::report::DailyReport;
use crate::risk::RiskVerdict;
use crate::scanner::ScanResult;
use crate::sector::SectorRotation;
use crate::sentiment::MarketSentimentSnapshot;
use crate::ShortlineToolkit;

/// Sentiment score assumed by `/api/v1/risk` when none is given.
const DEFAULT_RISK_SCORE: f64 = 50.0;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Query parameters shared by the scoring endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionQuery {
    /// Accepts `1`, `true`, `yes` or `on`
    #[serde(default)]
    pub debug: Option<String>,
    #[serde(default)]
    pub top_n: Option<usize>,
    /// Comma-separated sector names for `/api/v1/stocks`
    #[serde(default)]
    pub sectors: Option<String>,
    /// Stock code for `/api/v1/capital-flow`
    #[serde(default)]
    pub symbol: Option<String>,
}

impl DecisionQuery {
    fn debug(&self) -> bool {
        self.debug.as_deref().is_some_and(parse_bool_flag)
    }

    fn sector_list(&self) -> Option<Vec<String>> {
        let list: Vec<String> = self
            .sectors
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        (!list.is_empty()).then_some(list)
    }

    fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RiskQuery {
    #[serde(default)]
    pub score: Option<f64>,
}

/// Error body returned by the decision routes.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Request error rendered as `{"success": false, "error": {...}}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match status {
            StatusCode::BAD_REQUEST => "INVALID_INPUT",
            _ => "INTERNAL_ERROR",
        };

        let body = serde_json::json!({
            "success": false,
            "error": ErrorBody {
                code: code.to_string(),
                message: self.0.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "shortline".to_string(),
    })
}

pub async fn get_sentiment(
    State(toolkit): State<Arc<ShortlineToolkit>>,
    Query(query): Query<DecisionQuery>,
) -> Json<MarketSentimentSnapshot> {
    Json(toolkit.market_sentiment(query.debug()).await)
}

pub async fn get_sectors(
    State(toolkit): State<Arc<ShortlineToolkit>>,
    Query(query): Query<DecisionQuery>,
) -> Json<SectorRotation> {
    Json(toolkit.sector_rotation(query.top_n, query.debug()).await)
}

pub async fn get_stocks(
    State(toolkit): State<Arc<ShortlineToolkit>>,
    Query(query): Query<DecisionQuery>,
) -> Json<ScanResult> {
    let sectors = query.sector_list();
    Json(
        toolkit
            .scan_strong_stocks(sectors.as_deref(), query.top_n, query.debug())
            .await,
    )
}

pub async fn get_capital_flow(
    State(toolkit): State<Arc<ShortlineToolkit>>,
    Query(query): Query<DecisionQuery>,
) -> Json<CapitalFlowSnapshot> {
    Json(toolkit.capital_flow(query.symbol(), query.debug()).await)
}

pub async fn get_signal(
    State(toolkit): State<Arc<ShortlineToolkit>>,
    Query(query): Query<DecisionQuery>,
) -> Json<FusedSignal> {
    Json(toolkit.signal(query.debug()).await)
}

/// Risk verdict for an explicit sentiment score.
pub async fn get_risk(
    State(toolkit): State<Arc<ShortlineToolkit>>,
    Query(query): Query<RiskQuery>,
) -> Result<Json<RiskVerdict>, ApiError> {
    let score = query.score.unwrap_or(DEFAULT_RISK_SCORE);
    if !score.is_finite() {
        let err = Error::InvalidInput(format!("score must be a finite number, got {score}"));
        return Err(err.into());
    }
    Ok(Json(toolkit.risk_control(score)))
}

pub async fn get_report(
    State(toolkit): State<Arc<ShortlineToolkit>>,
    Query(query): Query<DecisionQuery>,
) -> Json<DailyReport> {
    Json(toolkit.daily_report(query.debug()).await)
}
