//! Strong-stock scanner.
//!
//! Multi-stage funnel over the full-market spot snapshot:
//! 1. Optional sector allow-list, resolved to constituent codes
//! 2. Pre-filter: change% > 4.5, strongest 120 kept
//! 3. Deep filter per instrument, first failed check rejects:
//!    change% > 5, quoted volume ratio > 1.5, allow-list membership,
//!    ~45 days of history (≥5 bars), rising 3-day close trend,
//!    computed volume expansion > 1.5, no high-volume bearish reversal
//! 4. Sort by (change%, volume ratio) and rank densely

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::{fetch_into, fetch_rows, first_non_empty, BoardKind, DailyBar, MarketDataProvider, Provenance, Row};
use crate::debug::{CallContext, DebugTrace};
use crate::normalize::{bare_code, fields, resolve_number, resolve_text, round_to};
use crate::DataSource;

/// Pre-filter change% threshold
pub const PREFILTER_CHANGE_PCT: f64 = 4.5;
/// Deep-filter change% threshold
pub const MIN_CHANGE_PCT: f64 = 5.0;
/// Minimum volume ratio, quoted and computed
pub const MIN_VOLUME_RATIO: f64 = 1.5;
/// Instruments kept after the pre-filter
pub const UNIVERSE_SIZE: usize = 120;
/// Calendar days of history requested per instrument
pub const HISTORY_DAYS: i64 = 45;
/// Bars required for the trend and volume checks
pub const MIN_HISTORY_BARS: usize = 5;
/// Closes that must rise strictly
pub const TREND_LOOKBACK: usize = 3;
/// Bars averaged for the volume baseline
pub const VOLUME_BASELINE_BARS: usize = 5;
/// Volume ratio above which a bearish day is a distribution signal
pub const BEARISH_VOLUME_RATIO: f64 = 2.2;
/// Day-over-day close change (%) below which a bearish day disqualifies
pub const BEARISH_DROP_PCT: f64 = -2.0;

// ============================================================================
// Output Types
// ============================================================================

/// One instrument that passed every filter stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCandidate {
    pub code: String,
    pub name: String,
    pub change_pct: f64,
    pub volume_ratio: f64,
    /// Dense 1-based rank
    pub strength_rank: u32,
    pub sector: String,
}

/// Scanner output plus the regime that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub candidates: Vec<StockCandidate>,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugTrace>,
}

impl ScanResult {
    /// Strongest candidate, if any.
    pub fn top(&self) -> Option<&StockCandidate> {
        self.candidates.first()
    }
}

// ============================================================================
// Rejection Reasons
// ============================================================================

/// Why an instrument left the deep filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rejection {
    /// change% not above the deep-filter threshold
    WeakChange,
    /// quoted volume ratio not above the threshold
    LowQuotedVolumeRatio,
    /// not a constituent of the requested sectors
    OutsideSectors,
    /// history fetch failed
    HistoryUnavailable,
    /// fewer bars than required
    ShortHistory,
    /// trailing closes not strictly rising
    NoUptrend,
    /// latest volume not expanded against the baseline
    NoVolumeExpansion,
    /// high-volume bearish reversal on the latest bar
    BearishReversal,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::WeakChange => "weak_change",
            Self::LowQuotedVolumeRatio => "low_quoted_volume_ratio",
            Self::OutsideSectors => "outside_sectors",
            Self::HistoryUnavailable => "history_unavailable",
            Self::ShortHistory => "short_history",
            Self::NoUptrend => "no_uptrend",
            Self::NoVolumeExpansion => "no_volume_expansion",
            Self::BearishReversal => "bearish_reversal",
        };
        f.write_str(label)
    }
}

// ============================================================================
// History Checks
// ============================================================================

/// True when the last `lookback` closes are strictly increasing.
pub fn trend_up(closes: &[f64], lookback: usize) -> bool {
    if lookback < 2 || closes.len() < lookback {
        return false;
    }
    closes[closes.len() - lookback..]
        .windows(2)
        .all(|w| w[1] > w[0])
}

/// Latest volume over the baseline mean, 0 when the baseline is not positive.
pub fn volume_ratio(latest: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        latest / baseline
    } else {
        0.0
    }
}

/// Bearish candle, closing more than 2% below the prior close, on a
/// volume ratio above 2.2.
pub fn is_bearish_reversal(latest: &DailyBar, previous_close: f64, volume_ratio: f64) -> bool {
    let day_change = if previous_close != 0.0 {
        (latest.close - previous_close) / previous_close * 100.0
    } else {
        0.0
    };
    latest.is_bearish() && day_change < BEARISH_DROP_PCT && volume_ratio > BEARISH_VOLUME_RATIO
}

/// Run the history stages over oldest-first bars.
///
/// Returns the computed volume ratio of the latest bar on success.
pub fn evaluate_history(bars: &[DailyBar]) -> Result<f64, Rejection> {
    if bars.len() < MIN_HISTORY_BARS {
        return Err(Rejection::ShortHistory);
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    if !trend_up(&closes, TREND_LOOKBACK) {
        return Err(Rejection::NoUptrend);
    }

    let last = bars.len() - 1;
    let baseline_bars = &bars[last.saturating_sub(VOLUME_BASELINE_BARS)..last];
    let baseline = baseline_bars.iter().map(|b| b.volume).sum::<f64>() / baseline_bars.len().max(1) as f64;
    let ratio = volume_ratio(bars[last].volume, baseline);
    if ratio <= MIN_VOLUME_RATIO {
        return Err(Rejection::NoVolumeExpansion);
    }

    if is_bearish_reversal(&bars[last], bars[last - 1].close, ratio) {
        return Err(Rejection::BearishReversal);
    }

    Ok(ratio)
}

// ============================================================================
// Ranking
// ============================================================================

/// A candidate before output rounding.
#[derive(Debug, Clone)]
struct RawCandidate {
    code: String,
    name: String,
    change_pct: f64,
    volume_ratio: f64,
    sector: String,
}

/// Sort by (change%, volume ratio) descending, keep `top_n`, rank 1..k.
fn rank_candidates(mut raw: Vec<RawCandidate>, top_n: usize) -> Vec<StockCandidate> {
    raw.sort_by(|a, b| {
        b.change_pct
            .total_cmp(&a.change_pct)
            .then(b.volume_ratio.total_cmp(&a.volume_ratio))
    });
    raw.into_iter()
        .take(top_n)
        .zip(1u32..)
        .map(|(c, rank)| StockCandidate {
            code: c.code,
            name: c.name,
            change_pct: round_to(c.change_pct, 2),
            volume_ratio: round_to(c.volume_ratio, 2),
            strength_rank: rank,
            sector: c.sector,
        })
        .collect()
}

/// The fixed candidates served when no spot snapshot is available.
///
/// Filtered by the allow-list when it leaves anything, then truncated and
/// re-ranked densely.
pub fn fallback_candidates(sectors: Option<&[String]>, top_n: usize) -> Vec<StockCandidate> {
    let base = [
        ("300001", "DemoTech", 8.1, 2.4, "AI-Compute"),
        ("002345", "ChipStar", 6.8, 1.9, "Semiconductor"),
        ("688888", "RoboCore", 5.5, 1.7, "Robotics"),
    ];

    let allowed: Vec<_> = match sectors {
        Some(names) if !names.is_empty() => base
            .iter()
            .filter(|(.., sector)| names.iter().any(|n| n == sector))
            .collect(),
        _ => Vec::new(),
    };
    let chosen: Vec<_> = if allowed.is_empty() {
        base.iter().collect()
    } else {
        allowed
    };

    chosen
        .into_iter()
        .take(top_n)
        .zip(1u32..)
        .map(|(&(code, name, change_pct, volume_ratio, sector), rank)| StockCandidate {
            code: code.to_string(),
            name: name.to_string(),
            change_pct,
            volume_ratio,
            strength_rank: rank,
            sector: sector.to_string(),
        })
        .collect()
}

// ============================================================================
// Scanner
// ============================================================================

/// Computes `ScanResult`s.
pub struct StockScanner {
    provider: Option<Arc<dyn MarketDataProvider>>,
}

impl StockScanner {
    pub fn new(provider: Option<Arc<dyn MarketDataProvider>>) -> Self {
        Self { provider }
    }

    fn fallback(
        ctx: &CallContext,
        sectors: Option<&[String]>,
        top_n: usize,
        trace: DebugTrace,
    ) -> ScanResult {
        ScanResult {
            candidates: fallback_candidates(sectors, top_n),
            data_source: DataSource::Fallback,
            debug_info: ctx.attach(trace),
        }
    }

    /// Union of constituent codes for the named sectors, `None` when empty.
    ///
    /// Codes are stored bare so they compare equal to the spot snapshot's.
    async fn resolve_allow_set(
        provider: &dyn MarketDataProvider,
        sectors: &[String],
        trace: &mut DebugTrace,
    ) -> Option<HashSet<String>> {
        let mut allowed = HashSet::new();

        for sector in sectors {
            let found = first_non_empty(
                &BoardKind::PRIORITY,
                trace,
                |kind| {
                    let api = match kind {
                        BoardKind::Industry => "industry_constituents",
                        BoardKind::Concept => "concept_constituents",
                    };
                    fetch_rows(
                        Provenance::with_param(api, sector.clone()),
                        provider.sector_constituents(sector, *kind),
                    )
                },
                |_, outcome| {
                    let codes: Vec<String> = outcome
                        .rows
                        .iter()
                        .map(|row| bare_code(&resolve_text(row, fields::CODE, "")).to_string())
                        .filter(|code| !code.is_empty())
                        .collect();
                    (!codes.is_empty()).then_some(codes)
                },
            )
            .await;

            if let Some((_, codes)) = found {
                allowed.extend(codes);
            }
        }

        (!allowed.is_empty()).then_some(allowed)
    }

    /// Scan for strong candidates, optionally restricted to `sectors`.
    pub async fn scan(
        &self,
        ctx: &CallContext,
        sectors: Option<&[String]>,
        top_n: usize,
    ) -> ScanResult {
        let mut trace = DebugTrace::new("scan_strong_stocks");
        trace.input("sectors_filter", sectors.map(|s| s.to_vec()).unwrap_or_default());
        trace.input("top_n", top_n);

        let Some(provider) = self.provider.as_deref() else {
            trace.fallback("provider_unavailable");
            warn!("No market data provider, serving fallback candidates");
            return Self::fallback(ctx, sectors, top_n, trace);
        };
        trace.provider(provider.name());

        let spot = fetch_into(&mut trace, Provenance::new("spot_snapshot"), provider.spot_snapshot()).await;
        if spot.is_empty() {
            let reason = if spot.error.is_some() {
                "spot_api_failed"
            } else {
                "spot_rows_empty"
            };
            trace.fallback(reason);
            warn!(reason, "Spot snapshot unavailable, serving fallback candidates");
            return Self::fallback(ctx, sectors, top_n, trace);
        }
        let rows = spot.rows;

        let allowed = match sectors {
            Some(names) if !names.is_empty() => {
                Self::resolve_allow_set(provider, names, &mut trace).await
            }
            _ => None,
        };
        let permitted = |code: &str| allowed.as_ref().map_or(true, |set| set.contains(code));

        // Stage 1: cheap pre-filter on the snapshot alone
        let mut pre_filtered: Vec<&Row> = rows
            .iter()
            .filter(|row| resolve_number(row, fields::CHANGE_PCT, 0.0) > PREFILTER_CHANGE_PCT)
            .filter(|row| permitted(bare_code(&resolve_text(row, fields::CODE, ""))))
            .collect();
        pre_filtered.sort_by(|a, b| {
            resolve_number(b, fields::CHANGE_PCT, 0.0).total_cmp(&resolve_number(a, fields::CHANGE_PCT, 0.0))
        });
        let pre_filtered_count = pre_filtered.len();
        let universe: Vec<&Row> = pre_filtered.into_iter().take(UNIVERSE_SIZE).collect();

        // Stage 2: per-instrument deep filter
        let end = ctx.trade_date;
        let start = end - Duration::days(HISTORY_DAYS);
        let mut rejections: BTreeMap<Rejection, usize> = BTreeMap::new();
        let mut raw = Vec::new();

        for row in &universe {
            let code = bare_code(&resolve_text(row, fields::CODE, "")).to_string();
            let change_pct = resolve_number(row, fields::CHANGE_PCT, 0.0);
            let quoted_ratio = resolve_number(row, fields::VOLUME_RATIO, 0.0);

            let verdict = if change_pct <= MIN_CHANGE_PCT {
                Err(Rejection::WeakChange)
            } else if quoted_ratio <= MIN_VOLUME_RATIO {
                Err(Rejection::LowQuotedVolumeRatio)
            } else if !permitted(&code) {
                Err(Rejection::OutsideSectors)
            } else {
                let history = fetch_into(
                    &mut trace,
                    Provenance::with_param("daily_history", code.clone()),
                    provider.daily_history(&code, start, end),
                )
                .await;
                match history.error {
                    Some(_) => Err(Rejection::HistoryUnavailable),
                    None => {
                        let bars: Vec<DailyBar> = history.rows.iter().map(DailyBar::from_row).collect();
                        evaluate_history(&bars)
                    }
                }
            };

            match verdict {
                Ok(volume_ratio) => raw.push(RawCandidate {
                    name: resolve_text(row, fields::NAME, ""),
                    sector: resolve_text(row, fields::INDUSTRY, "UNKNOWN"),
                    code,
                    change_pct,
                    volume_ratio,
                }),
                Err(reason) => {
                    debug!(code = %code, reason = %reason, "Candidate rejected");
                    *rejections.entry(reason).or_default() += 1;
                }
            }
        }

        let passed = raw.len();
        let candidates = rank_candidates(raw, top_n);

        trace.derive("spot_rows", rows.len());
        trace.derive("allow_set", allowed.as_ref().map_or(0, HashSet::len));
        trace.derive("pre_filtered", pre_filtered_count);
        trace.derive("universe", universe.len());
        trace.derive("passed", passed);
        trace.derive("candidates", candidates.len());
        trace.derive(
            "rejections",
            rejections
                .iter()
                .map(|(reason, n)| (reason.to_string(), serde_json::Value::from(*n)))
                .collect::<serde_json::Map<_, _>>(),
        );

        info!(
            spot_rows = rows.len(),
            pre_filtered = pre_filtered_count,
            universe = universe.len(),
            passed,
            returned = candidates.len(),
            "Stock scan completed"
        );

        ScanResult {
            candidates,
            data_source: DataSource::Live,
            debug_info: ctx.attach(trace),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
