//! Ordered field-name tables, one per logical field.
//!
//! Earlier names win. A new upstream schema variant is supported by adding
//! its column name to the relevant table.

// Spot snapshot / constituent rows
pub const CODE: &[&str] = &["代码", "股票代码"];
pub const NAME: &[&str] = &["名称", "股票名称"];
pub const CHANGE_PCT: &[&str] = &["涨跌幅", "涨跌幅%"];
pub const VOLUME_RATIO: &[&str] = &["量比"];
pub const INDUSTRY: &[&str] = &["所处行业", "行业"];
pub const TRADED_VALUE: &[&str] = &["成交额", "成交额(元)", "amount"];

// Limit-up pool rows
pub const BOARD_HEIGHT: &[&str] = &["连板数", "连板", "连板高度", "几天几板"];
pub const SEAL_STATUS: &[&str] = &["状态", "涨停状态", "封板状态"];
/// Status values meaning the stock is still sealed at limit-up.
pub const SEALED_TOKENS: &[&str] = &["封板", "涨停"];

// Sector snapshot rows
pub const SECTOR_NAME: &[&str] = &["板块名称", "名称"];
pub const SECTOR_CODE: &[&str] = &["板块代码", "代码"];
pub const SECTOR_CHANGE_PCT: &[&str] = &["涨跌幅", "涨跌幅%"];
pub const SECTOR_TURNOVER: &[&str] = &["成交额", "总成交额", "总市值"];
pub const SECTOR_UP_COUNT: &[&str] = &["上涨家数"];
pub const SECTOR_LIMIT_UP: &[&str] = &["涨停家数"];

// Daily history rows
pub const HIST_OPEN: &[&str] = &["开盘", "open"];
pub const HIST_CLOSE: &[&str] = &["收盘", "close"];
pub const HIST_VOLUME: &[&str] = &["成交量", "volume"];

// Capital flow rows
pub const NORTHBOUND_NET: &[&str] = &["value", "净流入", "当日净流入", "净买额"];
pub const NORTHBOUND_HIST_NET: &[&str] = &["当日成交净买额", "当日净流入", "净买额", "净流入"];
pub const MAIN_FLOW_HISTORY: &[&str] = &["主力净流入-净额", "主力净额", "主力净流入", "主力净流入净额"];
pub const MAIN_FLOW_RANK: &[&str] = &[
    "今日主力净流入-净额",
    "5日主力净流入-净额",
    "10日主力净流入-净额",
    "主力净流入-净额",
    "主力净额",
];
