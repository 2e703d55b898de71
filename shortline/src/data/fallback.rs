//! Uniform fetch results and the ordered-source fallback helper.
//!
//! "Upstream failed" and "upstream returned nothing" collapse into one
//! `FetchOutcome`. `first_non_empty` walks an ordered source list and stops
//! at the first source that yields something usable.

use std::future::Future;

use tracing::debug;

use super::provider::ProviderError;
use super::Row;
use crate::debug::DebugTrace;

// ============================================================================
// Provenance
// ============================================================================

/// Which endpoint, with which parameter, produced a set of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub api: &'static str,
    pub param: Option<String>,
}

impl Provenance {
    pub fn new(api: &'static str) -> Self {
        Self { api, param: None }
    }

    pub fn with_param(api: &'static str, param: impl Into<String>) -> Self {
        Self {
            api,
            param: Some(param.into()),
        }
    }
}

// ============================================================================
// Fetch Outcome
// ============================================================================

/// Rows from one upstream call plus why they may be unusable.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub provenance: Provenance,
    pub rows: Vec<Row>,
    /// Transport or decode error; `None` when the call itself succeeded
    pub error: Option<String>,
    /// The error is transient and the call may succeed later
    pub recoverable: bool,
}

impl FetchOutcome {
    pub fn succeeded(provenance: Provenance, rows: Vec<Row>) -> Self {
        Self {
            provenance,
            rows,
            error: None,
            recoverable: false,
        }
    }

    pub fn failed(provenance: Provenance, error: String) -> Self {
        Self {
            provenance,
            rows: Vec::new(),
            error: Some(error),
            recoverable: false,
        }
    }

    /// Failed outcome carrying the provider error's recoverability.
    pub fn from_error(provenance: Provenance, error: &ProviderError) -> Self {
        Self {
            recoverable: error.is_recoverable(),
            ..Self::failed(provenance, error.to_string())
        }
    }

    /// True for both failures and successful-but-empty calls.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Why nothing usable came back, if that is the case.
    pub fn failure_reason(&self) -> Option<String> {
        match (&self.error, self.rows.is_empty()) {
            (Some(err), _) => Some(err.clone()),
            (None, true) => Some("empty result".to_string()),
            (None, false) => None,
        }
    }

    /// Rows when present, `None` otherwise.
    pub fn into_rows(self) -> Option<Vec<Row>> {
        (!self.rows.is_empty()).then_some(self.rows)
    }
}

/// Await one provider call and fold its result into a `FetchOutcome`.
pub async fn fetch_rows<Fut>(provenance: Provenance, request: Fut) -> FetchOutcome
where
    Fut: Future<Output = Result<Vec<Row>, ProviderError>>,
{
    match request.await {
        Ok(rows) => {
            debug!(
                api = provenance.api,
                param = provenance.param.as_deref().unwrap_or(""),
                rows = rows.len(),
                "Upstream call succeeded"
            );
            FetchOutcome::succeeded(provenance, rows)
        }
        Err(e) => {
            debug!(
                api = provenance.api,
                param = provenance.param.as_deref().unwrap_or(""),
                error = %e,
                recoverable = e.is_recoverable(),
                "Upstream call failed"
            );
            FetchOutcome::from_error(provenance, &e)
        }
    }
}

/// `fetch_rows` that also records the call into a trace.
pub async fn fetch_into<Fut>(
    trace: &mut DebugTrace,
    provenance: Provenance,
    request: Fut,
) -> FetchOutcome
where
    Fut: Future<Output = Result<Vec<Row>, ProviderError>>,
{
    let outcome = fetch_rows(provenance, request).await;
    trace.record(&outcome);
    outcome
}

// ============================================================================
// Ordered Fallback
// ============================================================================

/// Try `sources` in order and return the first usable extraction.
///
/// Each source is fetched, recorded into `trace`, then handed to `extract`;
/// the walk stops at the first `Some`. Returns `None` when every source came
/// back empty, failed, or was rejected by `extract`; the caller then serves
/// its static default.
pub async fn first_non_empty<'s, S, T, F, Fut, X>(
    sources: &'s [S],
    trace: &mut DebugTrace,
    mut fetch: F,
    mut extract: X,
) -> Option<(&'s S, T)>
where
    F: FnMut(&'s S) -> Fut,
    Fut: Future<Output = FetchOutcome>,
    X: FnMut(&S, FetchOutcome) -> Option<T>,
{
    for source in sources {
        let outcome = fetch(source).await;
        trace.record(&outcome);
        if let Some(value) = extract(source, outcome) {
            return Some((source, value));
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_failure_reason() {
        let ok = FetchOutcome::succeeded(Provenance::new("spot_snapshot"), vec![row(json!({"a": 1}))]);
        assert!(ok.failure_reason().is_none());

        let empty = FetchOutcome::succeeded(Provenance::new("spot_snapshot"), Vec::new());
        assert_eq!(empty.failure_reason().as_deref(), Some("empty result"));

        let failed = FetchOutcome::failed(Provenance::new("spot_snapshot"), "HTTP 500".into());
        assert_eq!(failed.failure_reason().as_deref(), Some("HTTP 500"));
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rows_folds_error() {
        let outcome = fetch_rows(Provenance::with_param("limit_up_pool", "20240308"), async {
            Err::<Vec<Row>, _>(ProviderError::Network("reset".into()))
        })
        .await;
        assert!(outcome.is_empty());
        assert!(outcome.recoverable);
        assert!(outcome.error.unwrap().contains("reset"));

        let outcome = fetch_rows(Provenance::new("broken_board_pool"), async {
            Err::<Vec<Row>, _>(ProviderError::Unsupported("broken_board_pool"))
        })
        .await;
        assert!(!outcome.recoverable);
        assert_eq!(outcome.failure_reason().as_deref(), Some("Endpoint not supported: broken_board_pool"));
    }

    #[tokio::test]
    async fn test_first_non_empty_stops_at_first_usable() {
        let sources = ["a", "b", "c"];
        let mut trace = DebugTrace::new("test");

        let found = first_non_empty(
            &sources,
            &mut trace,
            |s| async move {
                match *s {
                    "a" => FetchOutcome::failed(Provenance::new("a"), "down".into()),
                    "b" => FetchOutcome::succeeded(Provenance::new("b"), vec![row(json!({"v": 2}))]),
                    _ => FetchOutcome::succeeded(Provenance::new("c"), vec![row(json!({"v": 3}))]),
                }
            },
            |_, outcome| outcome.into_rows(),
        )
        .await;

        let (source, rows) = found.unwrap();
        assert_eq!(*source, "b");
        assert_eq!(rows.len(), 1);
        // "c" is never attempted
        assert_eq!(trace.api_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_first_non_empty_exhausted() {
        let sources = [1, 2];
        let mut trace = DebugTrace::new("test");

        let found: Option<(&i32, Vec<Row>)> = first_non_empty(
            &sources,
            &mut trace,
            |_| async { FetchOutcome::succeeded(Provenance::new("x"), Vec::new()) },
            |_, outcome| outcome.into_rows(),
        )
        .await;

        assert!(found.is_none());
        assert_eq!(trace.api_calls.len(), 2);
        assert!(trace.api_calls.iter().all(|c| c.ok && c.rows == 0));
    }

    #[tokio::test]
    async fn test_extract_can_reject_non_empty_rows() {
        let sources = ["first", "second"];
        let mut trace = DebugTrace::new("test");

        let found = first_non_empty(
            &sources,
            &mut trace,
            |s| async move {
                FetchOutcome::succeeded(Provenance::new("rank"), vec![row(json!({"code": *s}))])
            },
            |_, outcome| {
                outcome
                    .rows
                    .iter()
                    .find(|r| r.get("code") == Some(&json!("second")))
                    .map(|_| 42)
            },
        )
        .await;

        assert_eq!(found.map(|(s, v)| (*s, v)), Some(("second", 42)));
    }
}
