//! Daily text report rendered from a fused signal.

use serde::{Deserialize, Serialize};

use crate::fusion::FusedSignal;
use crate::scanner::StockCandidate;
use crate::sector::SectorStrength;

/// Rendered report plus the signal it was rendered from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub report: String,
    pub signal: FusedSignal,
}

impl DailyReport {
    pub fn new(signal: FusedSignal) -> Self {
        Self {
            report: render_report(&signal),
            signal,
        }
    }
}

fn format_sectors(sectors: &[SectorStrength]) -> String {
    if sectors.is_empty() {
        return "无".to_string();
    }
    sectors
        .iter()
        .take(3)
        .enumerate()
        .map(|(i, s)| format!("{}. {} (strength {})", i + 1, s.name, s.strength))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_candidates(candidates: &[StockCandidate]) -> String {
    if candidates.is_empty() {
        return "暂无".to_string();
    }
    candidates
        .iter()
        .take(3)
        .map(|c| {
            format!(
                "{} {} | chg {}% | vol {}x",
                c.code, c.name, c.change_pct, c.volume_ratio
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the 【A股短线日报】 text.
pub fn render_report(signal: &FusedSignal) -> String {
    let m = &signal.market_sentiment;
    let risk = &signal.risk_control;
    let position_cap = (risk.max_position * 100.0).round() as i64;

    format!(
        "【A股短线日报】\n\n\
         市场情绪：score={} (涨停{} 跌停{} 炸板率{})\n\
         最高连板：{}\n\n\
         强势板块：\n{}\n\n\
         短线关注：\n{}\n\n\
         信号：{} (score={} confidence={} 持有{}天)\n\n\
         建议：\n\
         轻仓试错(<= {}%)\n\
         止损 {}%\n\
         止盈 {}%\n\n\
         风险：\n{}",
        m.market_sentiment_score,
        m.limit_up,
        m.limit_down,
        m.break_rate,
        m.max_height,
        format_sectors(&signal.top_sectors),
        format_candidates(&signal.candidates),
        signal.signal,
        signal.score,
        signal.confidence,
        signal.holding_days,
        position_cap,
        risk.stop_loss,
        risk.take_profit,
        risk.risk_note,
    )
}
