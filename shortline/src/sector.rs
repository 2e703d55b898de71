//! Sector rotation scorer.
//!
//! Ranks sector boards by a weighted strength:
//! `clamp(chg/7·45, 0, 45) + clamp(turnover/max_turnover·25, 0, 25) + clamp(lu/12·30, 0, 30)`.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{fetch_rows, first_non_empty, BoardKind, MarketDataProvider, Provenance, Row};
use crate::debug::{CallContext, DebugTrace};
use crate::normalize::{clamp, fields, resolve_count, resolve_number, resolve_text, round_to};
use crate::DataSource;

/// Share of advancing stocks assumed to be limit-up when the board row
/// carries no limit-up count.
const LIMIT_UP_ESTIMATE_RATIO: f64 = 0.08;

/// One scored sector board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStrength {
    pub name: String,
    pub change_pct: f64,
    pub turnover: i64,
    pub limit_up_count: u32,
    #[serde(default)]
    pub board_code: String,
    /// 0-100
    pub strength: f64,
}

/// Strongest sectors of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRotation {
    pub date: NaiveDate,
    pub top_sectors: Vec<SectorStrength>,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugTrace>,
}

impl SectorRotation {
    /// Names of the ranked sectors, strongest first.
    pub fn sector_names(&self) -> Vec<String> {
        self.top_sectors.iter().map(|s| s.name.clone()).collect()
    }
}

/// Weighted strength, each term clamped, rounded to 2 decimals.
pub fn sector_strength(change_pct: f64, turnover: f64, max_turnover: f64, limit_up_count: u32) -> f64 {
    let max_turnover = if max_turnover > 0.0 { max_turnover } else { 1.0 };
    let strength = clamp(change_pct / 7.0 * 45.0, 0.0, 45.0)
        + clamp(turnover / max_turnover * 25.0, 0.0, 25.0)
        + clamp(f64::from(limit_up_count) / 12.0 * 30.0, 0.0, 30.0);
    round_to(strength, 2)
}

/// Score every board row and sort strongest first.
///
/// The sort is stable, so ties keep upstream order.
pub fn score_sectors(rows: &[Row]) -> Vec<SectorStrength> {
    let max_turnover = rows
        .iter()
        .map(|row| resolve_number(row, fields::SECTOR_TURNOVER, 0.0))
        .fold(0.0_f64, f64::max);

    let mut sectors: Vec<SectorStrength> = rows
        .iter()
        .map(|row| {
            let change_pct = resolve_number(row, fields::SECTOR_CHANGE_PCT, 0.0);
            let turnover = resolve_number(row, fields::SECTOR_TURNOVER, 0.0).max(0.0);
            let up_count = resolve_count(row, fields::SECTOR_UP_COUNT);
            let mut limit_up_count = resolve_count(row, fields::SECTOR_LIMIT_UP);
            if limit_up_count == 0 && up_count > 0 {
                limit_up_count = (f64::from(up_count) * LIMIT_UP_ESTIMATE_RATIO).floor() as u32;
            }

            SectorStrength {
                name: resolve_text(row, fields::SECTOR_NAME, "UNKNOWN"),
                change_pct: round_to(change_pct, 2),
                turnover: turnover as i64,
                limit_up_count,
                board_code: resolve_text(row, fields::SECTOR_CODE, ""),
                strength: sector_strength(change_pct, turnover, max_turnover, limit_up_count),
            }
        })
        .collect();

    sectors.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    sectors
}

/// The three fixed sectors served when no board table could be read.
pub fn fallback_sectors() -> Vec<SectorStrength> {
    [
        ("AI-Compute", 4.2, 62_000_000_000, 7, 85.2),
        ("Semiconductor", 3.6, 58_000_000_000, 5, 79.8),
        ("Robotics", 2.9, 44_000_000_000, 4, 72.3),
    ]
    .into_iter()
    .map(|(name, change_pct, turnover, limit_up_count, strength)| SectorStrength {
        name: name.to_string(),
        change_pct,
        turnover,
        limit_up_count,
        board_code: String::new(),
        strength,
    })
    .collect()
}

// ============================================================================
// Scorer
// ============================================================================

/// Computes `SectorRotation`s.
pub struct SectorRotationScorer {
    provider: Option<Arc<dyn MarketDataProvider>>,
}

impl SectorRotationScorer {
    pub fn new(provider: Option<Arc<dyn MarketDataProvider>>) -> Self {
        Self { provider }
    }

    fn fallback(ctx: &CallContext, top_n: usize, trace: DebugTrace) -> SectorRotation {
        let mut top_sectors = fallback_sectors();
        top_sectors.truncate(top_n);
        SectorRotation {
            date: ctx.trade_date,
            top_sectors,
            data_source: DataSource::Fallback,
            debug_info: ctx.attach(trace),
        }
    }

    /// Top `top_n` sectors by strength.
    pub async fn evaluate(&self, ctx: &CallContext, top_n: usize) -> SectorRotation {
        let mut trace = DebugTrace::new("sector_rotation");
        trace.input("top_n", top_n);

        let Some(provider) = self.provider.as_deref() else {
            trace.fallback("provider_unavailable");
            warn!("No market data provider, serving fallback sectors");
            return Self::fallback(ctx, top_n, trace);
        };
        trace.provider(provider.name());

        let found = first_non_empty(
            &BoardKind::PRIORITY,
            &mut trace,
            |kind| async move {
                match kind {
                    BoardKind::Industry => {
                        fetch_rows(Provenance::new("industry_sectors"), provider.industry_sectors()).await
                    }
                    BoardKind::Concept => {
                        fetch_rows(Provenance::new("concept_sectors"), provider.concept_sectors()).await
                    }
                }
            },
            |_, outcome| outcome.into_rows(),
        )
        .await;

        let Some((kind, rows)) = found else {
            trace.fallback("no_sector_rows");
            warn!("Sector tables empty, serving fallback sectors");
            return Self::fallback(ctx, top_n, trace);
        };

        let mut top_sectors = score_sectors(&rows);
        top_sectors.truncate(top_n);

        trace.derive("board_kind", kind.to_string());
        trace.derive("input_rows", rows.len());
        trace.derive("returned_rows", top_sectors.len());

        info!(
            kind = %kind,
            input_rows = rows.len(),
            returned = top_sectors.len(),
            leader = top_sectors.first().map(|s| s.name.as_str()).unwrap_or(""),
            "Sector rotation computed"
        );

        SectorRotation {
            date: ctx.trade_date,
            top_sectors,
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
    fn test_strength_terms() {
        // 45 + 25 + 30
        assert_eq!(sector_strength(7.0, 100.0, 100.0, 12), 100.0);
        // 22.5 + 12.5 + 0
        assert_eq!(sector_strength(3.5, 50.0, 100.0, 0), 35.0);
    }

    #[test]
    fn test_strength_bounded() {
        for (chg, t, max, lu) in [(-30.0, -5.0, 0.0, 0), (99.0, 1e15, 1.0, u32::MAX), (f64::NAN, 0.0, 0.0, 3)] {
            let s = sector_strength(chg, t, max, lu);
            assert!((0.0..=100.0).contains(&s), "{chg} {t} {max} {lu} -> {s}");
        }
    }

    #[test]
    fn test_limit_up_estimated_from_up_count() {
        let scored = score_sectors(&rows(vec![
            json!({"板块名称": "甲", "上涨家数": 40}),
            json!({"板块名称": "乙", "上涨家数": 40, "涨停家数": 2}),
            json!({"板块名称": "丙", "上涨家数": 12}),
        ]));
        let by_name = |n: &str| scored.iter().find(|s| s.name == n).unwrap().limit_up_count;
        assert_eq!(by_name("甲"), 3);
        assert_eq!(by_name("乙"), 2);
        assert_eq!(by_name("丙"), 0);
    }

    #[test]
    fn test_zero_turnover_everywhere() {
        let scored = score_sectors(&rows(vec![json!({"板块名称": "甲", "涨跌幅": 3.5})]));
        assert_eq!(scored[0].strength, 22.5);
        assert_eq!(scored[0].turnover, 0);
        assert_eq!(scored[0].board_code, "");
    }

    #[test]
    fn test_sorted_desc_and_stable() {
        let scored = score_sectors(&rows(vec![
            json!({"板块名称": "A", "板块代码": "BK1", "涨跌幅": 1.0}),
            json!({"板块名称": "B", "板块代码": "BK2", "涨跌幅": "5.0"}),
            json!({"板块名称": "C", "板块代码": "BK3", "涨跌幅": 1.0}),
        ]));
        let names: Vec<_> = scored.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(scored[0].board_code, "BK2");
    }

    #[test]
    fn test_turnover_uses_unit_suffix() {
        let scored = score_sectors(&rows(vec![
            json!({"板块名称": "A", "成交额": "120亿"}),
            json!({"板块名称": "B", "成交额": "60亿"}),
        ]));
        assert_eq!(scored[0].name, "A");
        assert_eq!(scored[0].turnover, 12_000_000_000);
        assert_eq!(scored[0].strength, 25.0);
        assert_eq!(scored[1].strength, 12.5);
    }

    #[test]
    fn test_fallback_truncated() {
        let ctx = CallContext::new(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(), false);
        let rotation = SectorRotationScorer::fallback(&ctx, 2, DebugTrace::new("sector_rotation"));
        assert_eq!(rotation.sector_names(), vec!["AI-Compute", "Semiconductor"]);
        assert_eq!(rotation.data_source, DataSource::Fallback);
    }
}
