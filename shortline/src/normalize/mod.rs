//! Numeric normalizer for heterogeneous upstream rows.
//!
//! Upstream values arrive as JSON numbers, plain strings, locale-formatted
//! strings (`"1,234.5"`), magnitude-suffixed strings (`"12.3亿"`, `"560万"`)
//! or placeholders (`"-"`, `"--"`, `""`, `null`). Everything resolves to a
//! finite `f64`; nothing here fails.

pub mod fields;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::data::Row;

/// 亿: one hundred million
const HUNDRED_MILLION: f64 = 100_000_000.0;
/// 万: ten thousand
const TEN_THOUSAND: f64 = 10_000.0;

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// Parse one upstream value into a finite number, 0.0 when it cannot be.
pub fn normalize_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(text) => parse_numeric_text(text),
        _ => 0.0,
    }
}

/// Parse locale-formatted numeric text.
pub fn parse_numeric_text(raw: &str) -> f64 {
    let text = raw.trim().replace(',', "");
    if text.is_empty() || text.chars().all(|c| c == '-') {
        return 0.0;
    }

    let (body, unit) = if let Some(body) = text.strip_suffix('亿') {
        (body, HUNDRED_MILLION)
    } else if let Some(body) = text.strip_suffix('万') {
        (body, TEN_THOUSAND)
    } else {
        (text.as_str(), 1.0)
    };

    body.trim()
        .parse::<f64>()
        .map(|v| v * unit)
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn first_present<'r>(row: &'r Row, keys: &[&str]) -> Option<&'r Value> {
    keys.iter()
        .find_map(|key| row.get(*key).filter(|v| !is_blank(v)))
}

/// Resolve a numeric field through a prioritized list of column names.
///
/// The first present, non-empty column wins even if it parses to 0.
/// `default` applies only when no candidate column is present.
pub fn resolve_number(row: &Row, keys: &[&str], default: f64) -> f64 {
    first_present(row, keys)
        .map(normalize_number)
        .unwrap_or(default)
}

/// Resolve a non-negative count field, truncating fractions.
pub fn resolve_count(row: &Row, keys: &[&str]) -> u32 {
    let value = resolve_number(row, keys, 0.0);
    if value <= 0.0 {
        0
    } else {
        value.min(u32::MAX as f64) as u32
    }
}

/// Resolve a text field through a prioritized list of column names.
pub fn resolve_text(row: &Row, keys: &[&str], default: &str) -> String {
    match first_present(row, keys) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}

/// First integer embedded in a free-text board-height field (`"3连板"`,
/// `"5天3板"`), 0 when there is none.
pub fn parse_board_height(raw: &str) -> u32 {
    FIRST_INTEGER
        .find(raw)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Strip an exchange suffix: "000001.SZ" -> "000001".
pub fn bare_code(symbol: &str) -> &str {
    symbol.split('.').next().unwrap_or(symbol).trim()
}

/// Clamp to `[lo, hi]`, mapping NaN to `lo`.
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        return lo;
    }
    value.max(lo).min(hi)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_plain_numbers() {
        assert_eq!(normalize_number(&json!(12.5)), 12.5);
        assert_eq!(normalize_number(&json!(-3)), -3.0);
        assert_eq!(normalize_number(&json!("7.25")), 7.25);
    }

    #[test]
    fn test_thousands_separator_and_suffixes() {
        assert_eq!(parse_numeric_text("1,234.5"), 1234.5);
        assert_eq!(parse_numeric_text("12.5亿"), 1_250_000_000.0);
        assert_eq!(parse_numeric_text("3,000万"), 30_000_000.0);
        assert_eq!(parse_numeric_text(" -2.5亿 "), -250_000_000.0);
    }

    #[test]
    fn test_placeholders_are_zero() {
        for raw in ["", "-", "--", "   ", "N/A", "亿", "1.2.3"] {
            assert_eq!(parse_numeric_text(raw), 0.0, "input {raw:?}");
        }
        assert_eq!(normalize_number(&Value::Null), 0.0);
        assert_eq!(normalize_number(&json!(true)), 0.0);
        assert_eq!(normalize_number(&json!([1, 2])), 0.0);
    }

    #[test]
    fn test_non_finite_is_zero() {
        assert_eq!(parse_numeric_text("inf"), 0.0);
        assert_eq!(parse_numeric_text("NaN"), 0.0);
        assert_eq!(parse_numeric_text("1e400"), 0.0);
    }

    #[test]
    fn test_non_negative_sources_stay_non_negative() {
        for raw in ["0", "0.0", "15", "2.3万", "9,999亿", "--"] {
            let v = parse_numeric_text(raw);
            assert!(v.is_finite() && v >= 0.0, "input {raw:?} gave {v}");
        }
    }

    #[test]
    fn test_resolve_number_priority() {
        let r = row(json!({"总市值": "5000亿", "成交额": "120亿"}));
        assert_eq!(resolve_number(&r, fields::SECTOR_TURNOVER, 0.0), 12_000_000_000.0);

        let r = row(json!({"总市值": "5000亿"}));
        assert_eq!(resolve_number(&r, fields::SECTOR_TURNOVER, 0.0), 500_000_000_000.0);
    }

    #[test]
    fn test_resolve_number_skips_blank_columns() {
        let r = row(json!({"成交额": "", "成交额(元)": null, "amount": "88"}));
        assert_eq!(resolve_number(&r, fields::TRADED_VALUE, -1.0), 88.0);
    }

    #[test]
    fn test_resolve_number_default_only_when_absent() {
        let r = row(json!({"涨跌幅": "--"}));
        assert_eq!(resolve_number(&r, fields::CHANGE_PCT, 9.0), 0.0);
        assert_eq!(resolve_number(&Row::new(), fields::CHANGE_PCT, 9.0), 9.0);
    }

    #[test]
    fn test_resolve_count() {
        let r = row(json!({"上涨家数": "37.9", "涨停家数": -2}));
        assert_eq!(resolve_count(&r, fields::SECTOR_UP_COUNT), 37);
        assert_eq!(resolve_count(&r, fields::SECTOR_LIMIT_UP), 0);
    }

    #[test]
    fn test_resolve_text() {
        let r = row(json!({"股票代码": 600519, "名称": "  贵州茅台 "}));
        assert_eq!(resolve_text(&r, fields::CODE, ""), "600519");
        assert_eq!(resolve_text(&r, fields::NAME, ""), "贵州茅台");
        assert_eq!(resolve_text(&r, fields::INDUSTRY, "UNKNOWN"), "UNKNOWN");
    }

    #[test]
    fn test_parse_board_height() {
        assert_eq!(parse_board_height("3"), 3);
        assert_eq!(parse_board_height("4连板"), 4);
        assert_eq!(parse_board_height("5天3板"), 5);
        assert_eq!(parse_board_height("首板"), 0);
        assert_eq!(parse_board_height(""), 0);
    }

    #[test]
    fn test_bare_code() {
        assert_eq!(bare_code("688888.SH"), "688888");
        assert_eq!(bare_code(" 000001 "), "000001");
    }

    #[test]
    fn test_clamp_and_round() {
        assert_eq!(clamp(120.0, 0.0, 100.0), 100.0);
        assert_eq!(clamp(-5.0, 0.0, 100.0), 0.0);
        assert_eq!(clamp(f64::NAN, 0.0, 45.0), 0.0);
        assert_eq!(round_to(62.34567, 2), 62.35);
        assert_eq!(round_to(0.123456, 4), 0.1235);
    }
}
