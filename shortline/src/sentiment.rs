//! Market sentiment scorer.
//!
//! Turns the daily limit-move picture (limit-up / limit-down pools, board
//! heights, broken boards) into a 0-100 sentiment score:
//!
//! | Term | Weight | Full marks at |
//! |------|--------|---------------|
//! | limit-up count | 45 | 70 stocks |
//! | limit-down count (inverse) | 20 | 0 stocks, none at ≥12 |
//! | max consecutive board height | 20 | 6 boards |
//! | break rate (inverse) | 15 | 0%, none at ≥35% |

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{fetch_into, fetch_rows, first_non_empty, MarketDataProvider, Provenance, Row};
use crate::debug::{CallContext, DebugTrace};
use crate::normalize::{clamp, fields, parse_board_height, resolve_number, resolve_text, round_to};
use crate::DataSource;

/// Calendar days probed for the most recent non-empty limit-up pool.
pub const PROBE_DAYS: i64 = 10;

/// Inputs of the static fallback snapshot.
pub mod fallback {
    pub const LIMIT_UP: u32 = 42;
    pub const LIMIT_DOWN: u32 = 9;
    pub const MAX_HEIGHT: u32 = 3;
    pub const BREAK_RATE: f64 = 0.21;
    pub const TURNOVER: i64 = 980_000_000_000;
}

// ============================================================================
// Snapshot
// ============================================================================

/// Market-wide sentiment for one trade date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSentimentSnapshot {
    pub date: NaiveDate,
    pub limit_up: u32,
    pub limit_down: u32,
    pub max_height: u32,
    /// Fraction of limit-up attempts that failed to hold (0-1)
    pub break_rate: f64,
    /// Full-market traded value
    pub turnover: i64,
    /// 0-100
    pub market_sentiment_score: f64,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugTrace>,
}

/// Weighted sentiment score, clamped to [0, 100] and rounded to 2 decimals.
pub fn sentiment_score(limit_up: u32, limit_down: u32, max_height: u32, break_rate: f64) -> f64 {
    let score = clamp(f64::from(limit_up) / 70.0 * 45.0, 0.0, 45.0)
        + clamp((12.0 - f64::from(limit_down)) / 12.0 * 20.0, 0.0, 20.0)
        + clamp(f64::from(max_height) / 6.0 * 20.0, 0.0, 20.0)
        + clamp((0.35 - break_rate) / 0.35 * 15.0, 0.0, 15.0);
    round_to(clamp(score, 0.0, 100.0), 2)
}

/// Most recent weekdays within `days` calendar days of `anchor`, newest first.
pub fn recent_trade_dates(anchor: NaiveDate, days: i64) -> Vec<NaiveDate> {
    (0..days)
        .map(|offset| anchor - Duration::days(offset))
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Count limit-up rows whose seal status says the board broke.
fn count_broken_from_status(rows: &[Row]) -> usize {
    rows.iter()
        .filter(|row| {
            let status = resolve_text(row, fields::SEAL_STATUS, "");
            !status.is_empty() && !fields::SEALED_TOKENS.contains(&status.as_str())
        })
        .count()
}

fn max_board_height(rows: &[Row]) -> u32 {
    rows.iter()
        .map(|row| parse_board_height(&resolve_text(row, fields::BOARD_HEIGHT, "1")))
        .max()
        .unwrap_or(0)
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ============================================================================
// Scorer
// ============================================================================

/// Computes `MarketSentimentSnapshot`s.
pub struct MarketSentimentScorer {
    provider: Option<Arc<dyn MarketDataProvider>>,
}

impl MarketSentimentScorer {
    pub fn new(provider: Option<Arc<dyn MarketDataProvider>>) -> Self {
        Self { provider }
    }

    /// Static snapshot served when no live pool could be read.
    pub fn fallback(ctx: &CallContext, trace: DebugTrace) -> MarketSentimentSnapshot {
        MarketSentimentSnapshot {
            date: ctx.trade_date,
            limit_up: fallback::LIMIT_UP,
            limit_down: fallback::LIMIT_DOWN,
            max_height: fallback::MAX_HEIGHT,
            break_rate: round_to(fallback::BREAK_RATE, 4),
            turnover: fallback::TURNOVER,
            market_sentiment_score: sentiment_score(
                fallback::LIMIT_UP,
                fallback::LIMIT_DOWN,
                fallback::MAX_HEIGHT,
                fallback::BREAK_RATE,
            ),
            data_source: DataSource::Fallback,
            debug_info: ctx.attach(trace),
        }
    }

    /// Score market sentiment for the context's trade date.
    pub async fn evaluate(&self, ctx: &CallContext) -> MarketSentimentSnapshot {
        let mut trace = DebugTrace::new("market_sentiment");
        trace.input("provider_available", self.provider.is_some());

        let Some(provider) = self.provider.as_deref() else {
            trace.fallback("provider_unavailable");
            warn!("No market data provider, serving fallback sentiment");
            return Self::fallback(ctx, trace);
        };
        trace.provider(provider.name());

        let candidates = recent_trade_dates(ctx.trade_date, PROBE_DAYS);
        trace.input(
            "date_candidates",
            candidates
                .iter()
                .map(|d| d.format("%Y%m%d").to_string())
                .collect::<Vec<_>>(),
        );

        let probe = first_non_empty(
            &candidates,
            &mut trace,
            |date| {
                fetch_rows(
                    Provenance::with_param("limit_up_pool", date.format("%Y%m%d").to_string()),
                    provider.limit_up_pool(*date),
                )
            },
            |_, outcome| outcome.into_rows(),
        )
        .await;

        let Some((&date, limit_up_rows)) = probe else {
            trace.fallback("empty_limit_up_pool");
            warn!(probed = candidates.len(), "Limit-up pool empty on every probed date");
            return Self::fallback(ctx, trace);
        };
        let param = date.format("%Y%m%d").to_string();

        let limit_down_rows = fetch_into(
            &mut trace,
            Provenance::with_param("limit_down_pool", param.clone()),
            provider.limit_down_pool(date),
        )
        .await
        .rows;

        let broken_rows = fetch_into(
            &mut trace,
            Provenance::with_param("broken_board_pool", param),
            provider.broken_board_pool(date),
        )
        .await
        .rows;

        let limit_up = count_u32(limit_up_rows.len());
        let limit_down = count_u32(limit_down_rows.len());
        let max_height = max_board_height(&limit_up_rows);

        let break_count = if broken_rows.is_empty() {
            count_broken_from_status(&limit_up_rows)
        } else {
            broken_rows.len()
        };
        let total_events = limit_up_rows.len() + break_count;
        let break_rate = if total_events > 0 {
            break_count as f64 / total_events as f64
        } else {
            0.0
        };

        let spot = fetch_into(&mut trace, Provenance::new("spot_snapshot"), provider.spot_snapshot()).await;
        let turnover: f64 = spot
            .rows
            .iter()
            .map(|row| resolve_number(row, fields::TRADED_VALUE, 0.0))
            .sum();

        let score = sentiment_score(limit_up, limit_down, max_height, break_rate);

        trace.derive("break_count", break_count);
        trace.derive("total_lu_events", total_events);

        info!(
            date = %date,
            limit_up,
            limit_down,
            max_height,
            break_rate,
            score,
            "Market sentiment computed"
        );

        MarketSentimentSnapshot {
            date,
            limit_up,
            limit_down,
            max_height,
            break_rate: round_to(break_rate, 4),
            turnover: turnover.max(0.0) as i64,
            market_sentiment_score: score,
            data_source: DataSource::Live,
            debug_info: ctx.attach(trace),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
