//! Call context and diagnostic provenance.
//!
//! Every scorer records the upstream calls it made into a `DebugTrace`
//! regardless of the debug flag; the trace is only attached to the payload
//! when the call asked for diagnostics. Control flow never depends on it.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::FetchOutcome;

// ============================================================================
// Call Context
// ============================================================================

/// Per-invocation inputs shared by every scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// Logical trading moment all snapshots are computed against
    pub trade_date: NaiveDate,
    /// Attach `debug_info` to payloads
    pub debug: bool,
}

impl CallContext {
    pub fn new(trade_date: NaiveDate, debug: bool) -> Self {
        Self { trade_date, debug }
    }

    /// Context anchored on the local calendar date.
    pub fn today(debug: bool) -> Self {
        Self::new(Local::now().date_naive(), debug)
    }

    /// Hand out the trace only when diagnostics were requested.
    pub fn attach(&self, trace: DebugTrace) -> Option<DebugTrace> {
        self.debug.then_some(trace)
    }
}

// ============================================================================
// Debug Trace
// ============================================================================

/// One attempted upstream call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    /// Name of the provider that served the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub api: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    pub ok: bool,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure was transient (network, 5xx, 429)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recoverable: bool,
}

/// Diagnostic provenance attached as `debug_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugTrace {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub api_calls: Vec<ApiCall>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub derived: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl DebugTrace {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Default::default()
        }
    }

    /// Name the provider whose calls follow.
    pub fn provider(&mut self, name: &str) {
        self.provider = Some(name.to_string());
    }

    /// Record the outcome of one upstream call.
    pub fn record(&mut self, outcome: &FetchOutcome) {
        self.api_calls.push(ApiCall {
            provider: self.provider.clone(),
            api: outcome.provenance.api.to_string(),
            param: outcome.provenance.param.clone(),
            ok: outcome.error.is_none(),
            rows: outcome.rows.len(),
            error: outcome.error.clone(),
            recoverable: outcome.recoverable,
        });
    }

    /// Note an input the call was made with.
    pub fn input(&mut self, key: &str, value: impl Into<Value>) {
        self.inputs.insert(key.to_string(), value.into());
    }

    /// Note a derived stage count or intermediate value.
    pub fn derive(&mut self, key: &str, value: impl Into<Value>) {
        self.derived.insert(key.to_string(), value.into());
    }

    /// Mark that the static fallback was served.
    pub fn fallback(&mut self, reason: impl Into<String>) {
        self.fallback_reason = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FetchOutcome, Provenance};

    #[test]
    fn test_attach_respects_flag() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let trace = DebugTrace::new("market_sentiment");
        assert!(CallContext::new(date, false).attach(trace.clone()).is_none());
        assert_eq!(CallContext::new(date, true).attach(trace.clone()), Some(trace));
    }

    #[test]
    fn test_record_failed_call() {
        let mut trace = DebugTrace::new("capital_flow");
        let outcome = FetchOutcome::failed(
            Provenance::with_param("fund_flow_rank", "5日"),
            "HTTP 502".into(),
        );
        trace.record(&outcome);

        let call = &trace.api_calls[0];
        assert_eq!(call.provider, None);
        assert_eq!(call.api, "fund_flow_rank");
        assert_eq!(call.param.as_deref(), Some("5日"));
        assert!(!call.ok);
        assert!(!call.recoverable);
        assert_eq!(call.rows, 0);
    }

    #[test]
    fn test_calls_carry_provider_name() {
        let mut trace = DebugTrace::new("sector_rotation");
        trace.provider("eastmoney");
        trace.record(&FetchOutcome::succeeded(Provenance::new("industry_sectors"), Vec::new()));

        assert_eq!(trace.provider.as_deref(), Some("eastmoney"));
        assert_eq!(trace.api_calls[0].provider.as_deref(), Some("eastmoney"));
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["api_calls"][0]["provider"], "eastmoney");
    }

    #[test]
    fn test_serialization_skips_empty_sections() {
        let trace = DebugTrace::new("sector_rotation");
        let json = serde_json::to_value(&trace).unwrap();
        assert!(json.get("inputs").is_none());
        assert!(json.get("derived").is_none());
        assert!(json.get("fallback_reason").is_none());
        assert!(json.get("provider").is_none());
        assert_eq!(json["module"], "sector_rotation");
    }
}
