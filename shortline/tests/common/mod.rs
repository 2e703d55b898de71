//! Shared fixtures for the integration tests.
//!
//! `StaticProvider` serves canned rows per endpoint and counts every call,
//! so tests can assert both the payloads and how much upstream traffic a
//! scorer generated.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use shortline::data::{
    BoardKind, FundFlowWindow, MarketDataProvider, NorthboundSource, ProviderError, Row,
};

/// Logical trade date used across the tests (a Friday).
pub fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
}

/// Build a row from a JSON object literal.
pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row fixture must be an object")
}

pub fn rows(values: Vec<Value>) -> Vec<Row> {
    values.into_iter().map(row).collect()
}

// ============================================================================
// Static Provider
// ============================================================================

/// In-memory provider; anything not configured comes back empty.
#[derive(Default)]
pub struct StaticProvider {
    pub limit_up: HashMap<NaiveDate, Vec<Row>>,
    pub limit_down: Vec<Row>,
    pub broken: Vec<Row>,
    pub spot: Vec<Row>,
    pub industry: Vec<Row>,
    pub concept: Vec<Row>,
    /// Industry board constituents keyed by sector name
    pub constituents: HashMap<String, Vec<Row>>,
    /// Concept board constituents keyed by sector name
    pub concept_constituents: HashMap<String, Vec<Row>>,
    pub history: HashMap<String, Vec<Row>>,
    pub northbound: HashMap<NorthboundSource, Vec<Row>>,
    pub fund_flow: HashMap<String, Vec<Row>>,
    pub rank: HashMap<FundFlowWindow, Vec<Row>>,
    /// Every endpoint fails with a network error
    pub fail_all: bool,
    calls: AtomicU32,
    limit_up_calls: AtomicU32,
    history_calls: AtomicU32,
}

impl StaticProvider {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn limit_up_calls(&self) -> u32 {
        self.limit_up_calls.load(Ordering::Relaxed)
    }

    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::Relaxed)
    }

    fn serve(&self, rows: Option<&Vec<Row>>) -> Result<Vec<Row>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_all {
            return Err(ProviderError::Network("mock network failure".into()));
        }
        Ok(rows.cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn limit_up_pool(&self, date: NaiveDate) -> Result<Vec<Row>, ProviderError> {
        self.limit_up_calls.fetch_add(1, Ordering::Relaxed);
        self.serve(self.limit_up.get(&date))
    }

    async fn limit_down_pool(&self, _date: NaiveDate) -> Result<Vec<Row>, ProviderError> {
        self.serve(Some(&self.limit_down))
    }

    async fn broken_board_pool(&self, _date: NaiveDate) -> Result<Vec<Row>, ProviderError> {
        self.serve(Some(&self.broken))
    }

    async fn spot_snapshot(&self) -> Result<Vec<Row>, ProviderError> {
        self.serve(Some(&self.spot))
    }

    async fn industry_sectors(&self) -> Result<Vec<Row>, ProviderError> {
        self.serve(Some(&self.industry))
    }

    async fn concept_sectors(&self) -> Result<Vec<Row>, ProviderError> {
        self.serve(Some(&self.concept))
    }

    async fn sector_constituents(
        &self,
        board: &str,
        kind: BoardKind,
    ) -> Result<Vec<Row>, ProviderError> {
        match kind {
            BoardKind::Industry => self.serve(self.constituents.get(board)),
            BoardKind::Concept => self.serve(self.concept_constituents.get(board)),
        }
    }

    async fn daily_history(
        &self,
        code: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Row>, ProviderError> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        self.serve(self.history.get(code))
    }

    async fn northbound_flow(&self, source: NorthboundSource) -> Result<Vec<Row>, ProviderError> {
        self.serve(self.northbound.get(&source))
    }

    async fn individual_fund_flow(
        &self,
        code: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Row>, ProviderError> {
        self.serve(self.fund_flow.get(code))
    }

    async fn fund_flow_rank(&self, window: FundFlowWindow) -> Result<Vec<Row>, ProviderError> {
        self.serve(self.rank.get(&window))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Oldest-first bars with rising closes and a 3x volume spike on the last day.
pub fn breakout_history(base: f64) -> Vec<Row> {
    let closes = [base, base * 1.02, base * 1.04, base * 1.06, base * 1.08, base * 1.15];
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let volume = if i == closes.len() - 1 { 300_000.0 } else { 100_000.0 };
            row(serde_json::json!({
                "日期": format!("2024-03-0{}", i + 1),
                "开盘": close * 0.99,
                "收盘": close,
                "成交量": volume,
            }))
        })
        .collect()
}

/// A market with one live answer on every endpoint.
///
/// Semiconductor leads the industry table; its constituents are 600002 and
/// 600005. Both pass the deep filter, 600001 fails on a short history.
pub fn live_market() -> StaticProvider {
    use serde_json::json;

    let mut provider = StaticProvider::default();

    // Friday's pool is empty, Thursday's is not
    provider.limit_up.insert(
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
        rows(vec![
            json!({"代码": "600010", "连板数": 1, "状态": "封板"}),
            json!({"代码": "600011", "连板数": "2", "状态": "封板"}),
            json!({"代码": "600012", "连板数": "4连板", "状态": "封板"}),
        ]),
    );
    provider.limit_down = rows(vec![json!({"代码": "600020"}), json!({"代码": "600021"})]);
    provider.broken = rows(vec![json!({"代码": "600030"})]);

    provider.spot = rows(vec![
        json!({"代码": "600001", "名称": "Alpha", "涨跌幅": 7.0, "量比": 2.0, "成交额": "1,000,000,000", "所处行业": "半导体"}),
        json!({"代码": "600002", "名称": "Beta", "涨跌幅": 6.0, "量比": 1.8, "成交额": 800_000_000.0, "所处行业": "半导体"}),
        json!({"代码": "600003", "名称": "Gamma", "涨跌幅": 4.0, "量比": 3.0, "成交额": 600_000_000.0, "所处行业": "银行"}),
        json!({"代码": "600004", "名称": "Delta", "涨跌幅": 4.8, "量比": 2.5, "成交额": 400_000_000.0, "所处行业": "半导体"}),
        json!({"代码": "600005", "名称": "Epsilon", "涨跌幅": 9.5, "量比": 2.6, "成交额": 200_000_000.0, "所处行业": "半导体"}),
        json!({"代码": "600006", "名称": "Zeta", "涨跌幅": 8.0, "量比": 2.0, "成交额": "--", "所处行业": "银行"}),
    ]);

    provider.industry = rows(vec![
        json!({"板块名称": "银行", "板块代码": "BK0475", "涨跌幅": 0.5, "成交额": 20_000_000_000.0, "上涨家数": 10}),
        json!({"板块名称": "半导体", "板块代码": "BK1036", "涨跌幅": 4.0, "成交额": 60_000_000_000.0, "上涨家数": 60}),
    ]);
    provider.constituents.insert(
        "半导体".into(),
        rows(vec![
            json!({"代码": "600001"}),
            json!({"代码": "600002"}),
            json!({"代码": "600004"}),
            json!({"代码": "600005"}),
        ]),
    );

    provider.history.insert(
        "600001".into(),
        breakout_history(10.0).into_iter().take(4).collect(),
    );
    provider.history.insert("600002".into(), breakout_history(20.0));
    provider.history.insert("600005".into(), breakout_history(30.0));
    provider.history.insert("600006".into(), breakout_history(40.0));

    provider.northbound.insert(
        NorthboundSource::Direct,
        rows(vec![
            json!({"date": "2024-03-05", "value": -500_000_000.0}),
            json!({"date": "2024-03-06", "value": 0.0}),
            json!({"date": "2024-03-07", "value": 200_000_000.0}),
            json!({"date": "2024-03-08", "value": 1_000_000_000.0}),
        ]),
    );

    provider.rank.insert(
        FundFlowWindow::Today,
        rows(vec![
            json!({"代码": "600005", "名称": "Epsilon", "今日主力净流入-净额": 320_000_000.0}),
            json!({"代码": "600002", "名称": "Beta", "今日主力净流入-净额": 160_000_000.0}),
        ]),
    );

    provider
}
