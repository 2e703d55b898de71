//! Eastmoney adapter for A-share market data.
//!
//! # Endpoints
//! - `push2ex`: daily limit-up / limit-down / broken-board pools
//! - `push2`: `clist` tables (spot snapshot, sector boards, constituents,
//!   fund-flow rank) and the northbound `kamt.kline` series
//! - `push2his`: daily kline history and per-stock fund-flow history
//! - `datacenter`: historical connect statistics (`RPT_MUTUAL_DEAL_HISTORY`)
//!
//! # Row Shape
//! Responses are mapped into rows keyed by the Chinese column names the
//! normalizer's field tables expect (`代码`, `涨跌幅`, `成交额`, ...).
//! Values are passed through untouched; `"-"` placeholders stay strings and
//! are resolved downstream.
//!
//! No API key is required. All endpoints are public and unauthenticated.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use super::provider::{BoardKind, FundFlowWindow, MarketDataProvider, NorthboundSource, ProviderError};
use super::Row;
use crate::normalize::{bare_code, fields, resolve_text};
use shortline_common::ProviderConfig;

// ============================================================================
// Constants
// ============================================================================

/// Token the push2ex pool endpoints expect
const POOL_UT: &str = "7eea3edcaed734bea9cbfc24409ed989";

/// Token the push2 clist endpoint expects
const CLIST_UT: &str = "bd1d9ddb04089700cf9c27f6f7426281";

/// Rows requested per clist page
const CLIST_PAGE_SIZE: usize = 100;

/// Upper bound on clist pages walked per table
const CLIST_MAX_PAGES: usize = 100;

/// Full A-share universe (SZ main, SZ ChiNext, SH main, SH STAR, BJ)
const FS_A_SHARES: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048";

/// Industry boards
const FS_INDUSTRY_BOARDS: &str = "m:90 t:2 f:!50";

/// Concept boards
const FS_CONCEPT_BOARDS: &str = "m:90 t:3 f:!50";

/// Spot table columns: (field, row key)
const SPOT_COLUMNS: &[(&str, &str)] = &[
    ("f12", "代码"),
    ("f14", "名称"),
    ("f2", "最新价"),
    ("f3", "涨跌幅"),
    ("f5", "成交量"),
    ("f6", "成交额"),
    ("f8", "换手率"),
    ("f10", "量比"),
    ("f100", "所处行业"),
];

/// Board table columns
const BOARD_COLUMNS: &[(&str, &str)] = &[
    ("f12", "板块代码"),
    ("f14", "板块名称"),
    ("f3", "涨跌幅"),
    ("f6", "成交额"),
    ("f20", "总市值"),
    ("f104", "上涨家数"),
    ("f105", "下跌家数"),
];

/// Limit pool columns
const POOL_COLUMNS: &[(&str, &str)] = &[
    ("c", "代码"),
    ("n", "名称"),
    ("zdp", "涨跌幅"),
    ("amount", "成交额"),
    ("lbc", "连板数"),
    ("zbc", "炸板次数"),
    ("hybk", "所属行业"),
];

/// Daily kline CSV columns, in `fields2` order
const KLINE_COLUMNS: &[&str] = &["日期", "开盘", "收盘", "最高", "最低", "成交量", "成交额"];

/// Fund-flow daykline CSV columns, in `fields2` order
const FFLOW_COLUMNS: &[&str] = &[
    "日期",
    "主力净流入-净额",
    "小单净流入-净额",
    "中单净流入-净额",
    "大单净流入-净额",
    "超大单净流入-净额",
];

/// Datacenter amounts are reported in millions of yuan
const DATACENTER_AMOUNT_UNIT: f64 = 1_000_000.0;

/// Seconds a board name → code table stays valid
const BOARD_TABLE_TTL_SECS: i64 = 600;

// ============================================================================
// Endpoints
// ============================================================================

/// Base URLs of the eastmoney hosts.
///
/// Overridable so tests can point every host at a local mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EastmoneyEndpoints {
    pub push2: String,
    pub push2ex: String,
    pub push2his: String,
    pub datacenter: String,
}

impl Default for EastmoneyEndpoints {
    fn default() -> Self {
        Self {
            push2: "https://push2.eastmoney.com".into(),
            push2ex: "https://push2ex.eastmoney.com".into(),
            push2his: "https://push2his.eastmoney.com".into(),
            datacenter: "https://datacenter-web.eastmoney.com".into(),
        }
    }
}

impl EastmoneyEndpoints {
    /// Route every host to the same base URL.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            push2: base.clone(),
            push2ex: base.clone(),
            push2his: base.clone(),
            datacenter: base,
        }
    }
}

// ============================================================================
// Symbol Mapping
// ============================================================================

/// Eastmoney `secid`: market prefix 1 for Shanghai, 0 otherwise.
fn secid(code: &str) -> String {
    let code = bare_code(code);
    let market = if code.starts_with('6') || code.starts_with('9') {
        1
    } else {
        0
    };
    format!("{}.{}", market, code)
}

fn ymd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `RPT_MUTUAL_DEAL_HISTORY` type code for a historical label.
fn mutual_type(source: NorthboundSource) -> &'static str {
    match source {
        NorthboundSource::HistoryShanghai => "001",
        NorthboundSource::HistoryShenzhen => "003",
        NorthboundSource::Direct | NorthboundSource::HistoryNorthbound => "005",
    }
}

/// clist sort field of a fund-flow rank window.
fn rank_field(window: FundFlowWindow) -> &'static str {
    match window {
        FundFlowWindow::Today => "f62",
        FundFlowWindow::FiveDay => "f164",
        FundFlowWindow::TenDay => "f174",
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

/// Copy selected fields of an upstream object under their row keys.
fn map_columns(source: &Map<String, Value>, columns: &[(&str, &str)]) -> Row {
    columns
        .iter()
        .filter_map(|(field, key)| source.get(*field).map(|v| (key.to_string(), v.clone())))
        .collect()
}

/// Split one comma-separated kline record into a row.
fn csv_row(line: &str, columns: &[&str]) -> Row {
    columns
        .iter()
        .zip(line.split(','))
        .map(|(key, value)| (key.to_string(), Value::String(value.trim().to_string())))
        .collect()
}

fn object_array<'v>(value: &'v Value, pointer: &str) -> Vec<&'v Map<String, Value>> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn string_array<'v>(value: &'v Value, pointer: &str) -> Vec<&'v str> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Extract the `YYYY-MM-DD` prefix of a date-ish field.
fn row_date(row: &Row) -> Option<NaiveDate> {
    let text = resolve_text(row, &["日期"], "");
    NaiveDate::parse_from_str(text.get(..10).unwrap_or(&text), "%Y-%m-%d").ok()
}

// ============================================================================
// Eastmoney Provider
// ============================================================================

/// Board name → board code table with an expiry.
#[derive(Debug, Clone)]
struct BoardTable {
    codes: HashMap<String, String>,
    expires_at: DateTime<Utc>,
}

impl BoardTable {
    fn new(codes: HashMap<String, String>) -> Self {
        Self {
            codes,
            expires_at: Utc::now() + chrono::Duration::seconds(BOARD_TABLE_TTL_SECS),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// `MarketDataProvider` backed by the public eastmoney endpoints.
pub struct EastmoneyProvider {
    client: reqwest::Client,
    endpoints: EastmoneyEndpoints,
    /// Board tables already walked, so constituent lookups by name share one fetch
    board_tables: RwLock<HashMap<BoardKind, BoardTable>>,
}

impl EastmoneyProvider {
    /// Create a provider against the production hosts
    pub fn new(config: &ProviderConfig) -> Self {
        Self::with_endpoints(config, EastmoneyEndpoints::default())
    }

    /// Create a provider against custom hosts
    pub fn with_endpoints(config: &ProviderConfig, endpoints: EastmoneyEndpoints) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoints,
            board_tables: RwLock::new(HashMap::new()),
        }
    }

    /// GET a JSON document.
    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        debug!(url = %url, "Fetching from eastmoney");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Parse(format!("Failed to parse response: {}", e)))
    }

    /// Fetch one of the push2ex limit pools.
    async fn fetch_pool(
        &self,
        topic: &str,
        sort: &str,
        date: NaiveDate,
    ) -> Result<Vec<Row>, ProviderError> {
        let url = format!("{}/getTopic{}", self.endpoints.push2ex, topic);
        let query = [
            ("ut", POOL_UT.to_string()),
            ("dpt", "wz.ztzt".to_string()),
            ("Pageindex", "0".to_string()),
            ("pagesize", "10000".to_string()),
            ("sort", sort.to_string()),
            ("date", ymd(date)),
        ];
        let body = self.get_json(&url, &query).await?;

        if let Some(rc) = body.get("rc").and_then(Value::as_i64) {
            if rc != 0 {
                return Err(ProviderError::Upstream(format!("rc={}", rc)));
            }
        }

        // `data: null` is how non-trading days come back
        Ok(object_array(&body, "/data/pool")
            .into_iter()
            .map(|item| map_columns(item, POOL_COLUMNS))
            .collect())
    }

    /// Walk a clist table page by page.
    async fn fetch_clist(
        &self,
        fs: &str,
        sort_field: &str,
        columns: &[(&str, &str)],
    ) -> Result<Vec<Row>, ProviderError> {
        let url = format!("{}/api/qt/clist/get", self.endpoints.push2);
        let field_list = columns
            .iter()
            .map(|(field, _)| *field)
            .collect::<Vec<_>>()
            .join(",");

        let mut rows = Vec::new();
        for page in 1..=CLIST_MAX_PAGES {
            let query = [
                ("pn", page.to_string()),
                ("pz", CLIST_PAGE_SIZE.to_string()),
                ("po", "1".to_string()),
                ("np", "1".to_string()),
                ("ut", CLIST_UT.to_string()),
                ("fltt", "2".to_string()),
                ("invt", "2".to_string()),
                ("fid", sort_field.to_string()),
                ("fs", fs.to_string()),
                ("fields", field_list.clone()),
            ];
            let body = self.get_json(&url, &query).await?;

            let items = object_array(&body, "/data/diff");
            if items.is_empty() {
                break;
            }
            rows.extend(items.into_iter().map(|item| map_columns(item, columns)));

            let total = body
                .pointer("/data/total")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            if rows.len() >= total {
                break;
            }
        }

        debug!(fs = fs, rows = rows.len(), "clist table fetched");
        Ok(rows)
    }

    /// Lookup in a fresh cached board table.
    ///
    /// `None` when no unexpired table is cached for `kind`.
    fn cached_board_code(&self, board: &str, kind: BoardKind) -> Option<Option<String>> {
        let tables = self.board_tables.read().ok()?;
        tables
            .get(&kind)
            .filter(|table| !table.is_expired())
            .map(|table| table.codes.get(board).cloned())
    }

    /// Board code for a board name, looked up in the board table.
    ///
    /// The table is walked once per TTL window and shared by later lookups.
    async fn resolve_board_code(&self, board: &str, kind: BoardKind) -> Result<String, ProviderError> {
        if board.starts_with("BK") {
            return Ok(board.to_string());
        }
        let unknown = || ProviderError::InvalidRequest(format!("Unknown {} board: {}", kind, board));

        if let Some(cached) = self.cached_board_code(board, kind) {
            return cached.ok_or_else(unknown);
        }

        let boards = match kind {
            BoardKind::Industry => self.industry_sectors().await?,
            BoardKind::Concept => self.concept_sectors().await?,
        };
        let codes: HashMap<String, String> = boards
            .iter()
            .map(|row| {
                (
                    resolve_text(row, fields::SECTOR_NAME, ""),
                    resolve_text(row, fields::SECTOR_CODE, ""),
                )
            })
            .filter(|(name, code)| !name.is_empty() && !code.is_empty())
            .collect();
        let found = codes.get(board).cloned();

        if !codes.is_empty() {
            debug!(kind = %kind, boards = codes.len(), "Board table cached");
            if let Ok(mut tables) = self.board_tables.write() {
                tables.insert(kind, BoardTable::new(codes));
            }
        }

        found.ok_or_else(unknown)
    }

    /// Historical connect statistics, oldest first.
    async fn fetch_mutual_history(&self, source: NorthboundSource) -> Result<Vec<Row>, ProviderError> {
        let url = format!("{}/api/data/v1/get", self.endpoints.datacenter);
        let query = [
            ("reportName", "RPT_MUTUAL_DEAL_HISTORY".to_string()),
            ("columns", "ALL".to_string()),
            ("filter", format!("(MUTUAL_TYPE=\"{}\")", mutual_type(source))),
            ("sortColumns", "TRADE_DATE".to_string()),
            ("sortTypes", "-1".to_string()),
            ("pageSize", "500".to_string()),
            ("pageNumber", "1".to_string()),
            ("source", "WEB".to_string()),
            ("client", "WEB".to_string()),
        ];
        let body = self.get_json(&url, &query).await?;

        let mut rows: Vec<Row> = object_array(&body, "/result/data")
            .into_iter()
            .map(|item| {
                let mut row = Row::new();
                if let Some(date) = item.get("TRADE_DATE") {
                    row.insert("日期".into(), date.clone());
                }
                if let Some(net) = item.get("NET_DEAL_AMT").and_then(Value::as_f64) {
                    row.insert(
                        "当日成交净买额".into(),
                        Value::from(net * DATACENTER_AMOUNT_UNIT),
                    );
                }
                row
            })
            .collect();

        // Upstream sorts newest first
        rows.reverse();
        Ok(rows)
    }

    /// Direct northbound daily series from `kamt.kline`, oldest first.
    async fn fetch_kamt_series(&self) -> Result<Vec<Row>, ProviderError> {
        let url = format!("{}/api/qt/kamt.kline/get", self.endpoints.push2);
        let query = [
            ("fields1", "f1,f3,f5".to_string()),
            ("fields2", "f51,f52".to_string()),
            ("klt", "101".to_string()),
            ("lmt", "500".to_string()),
        ];
        let body = self.get_json(&url, &query).await?;

        // Values are reported in units of 10k yuan
        Ok(string_array(&body, "/data/s2n")
            .into_iter()
            .filter_map(|line| {
                let (date, value) = line.split_once(',')?;
                let mut row = Row::new();
                row.insert("date".into(), Value::String(date.trim().to_string()));
                row.insert("value".into(), Value::String(format!("{}万", value.trim())));
                Some(row)
            })
            .collect())
    }
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for EastmoneyProvider {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    async fn limit_up_pool(&self, date: NaiveDate) -> Result<Vec<Row>, ProviderError> {
        self.fetch_pool("ZTPool", "fbt:asc", date).await
    }

    async fn limit_down_pool(&self, date: NaiveDate) -> Result<Vec<Row>, ProviderError> {
        self.fetch_pool("DTPool", "fund:asc", date).await
    }

    async fn broken_board_pool(&self, date: NaiveDate) -> Result<Vec<Row>, ProviderError> {
        self.fetch_pool("ZBPool", "fbt:asc", date).await
    }

    async fn spot_snapshot(&self) -> Result<Vec<Row>, ProviderError> {
        self.fetch_clist(FS_A_SHARES, "f3", SPOT_COLUMNS).await
    }

    async fn industry_sectors(&self) -> Result<Vec<Row>, ProviderError> {
        self.fetch_clist(FS_INDUSTRY_BOARDS, "f3", BOARD_COLUMNS).await
    }

    async fn concept_sectors(&self) -> Result<Vec<Row>, ProviderError> {
        self.fetch_clist(FS_CONCEPT_BOARDS, "f3", BOARD_COLUMNS).await
    }

    async fn sector_constituents(
        &self,
        board: &str,
        kind: BoardKind,
    ) -> Result<Vec<Row>, ProviderError> {
        let code = self.resolve_board_code(board, kind).await?;
        self.fetch_clist(&format!("b:{} f:!50", code), "f3", SPOT_COLUMNS)
            .await
    }

    async fn daily_history(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>, ProviderError> {
        if bare_code(code).is_empty() {
            return Err(ProviderError::InvalidRequest("Empty stock code".into()));
        }

        let url = format!("{}/api/qt/stock/kline/get", self.endpoints.push2his);
        let query = [
            ("secid", secid(code)),
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57".to_string()),
            ("klt", "101".to_string()),
            // forward-adjusted
            ("fqt", "1".to_string()),
            ("beg", ymd(start)),
            ("end", ymd(end)),
        ];
        let body = self.get_json(&url, &query).await?;

        Ok(string_array(&body, "/data/klines")
            .into_iter()
            .map(|line| csv_row(line, KLINE_COLUMNS))
            .collect())
    }

    async fn northbound_flow(&self, source: NorthboundSource) -> Result<Vec<Row>, ProviderError> {
        if source.is_historical() {
            self.fetch_mutual_history(source).await
        } else {
            self.fetch_kamt_series().await
        }
    }

    async fn individual_fund_flow(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Row>, ProviderError> {
        let url = format!("{}/api/qt/stock/fflow/daykline/get", self.endpoints.push2his);
        let query = [
            ("lmt", "0".to_string()),
            ("klt", "101".to_string()),
            ("secid", secid(code)),
            ("fields1", "f1,f2,f3,f7".to_string()),
            (
                "fields2",
                "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61,f62,f63,f64,f65".to_string(),
            ),
        ];
        let body = self.get_json(&url, &query).await?;

        Ok(string_array(&body, "/data/klines")
            .into_iter()
            .map(|line| csv_row(line, FFLOW_COLUMNS))
            .filter(|row| row_date(row).is_some_and(|d| d >= start && d <= end))
            .collect())
    }

    async fn fund_flow_rank(&self, window: FundFlowWindow) -> Result<Vec<Row>, ProviderError> {
        let field = rank_field(window);
        let key = format!("{}主力净流入-净额", window.label());

        let rows = self
            .fetch_clist(FS_A_SHARES, field, &[("f12", "代码"), ("f14", "名称"), (field, "")])
            .await?;

        // The flow column's key depends on the window, so it is renamed here
        Ok(rows
            .into_iter()
            .map(|mut row| {
                if let Some(value) = row.remove("") {
                    row.insert(key.clone(), value);
                }
                row
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
