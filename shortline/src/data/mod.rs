//! Market data layer for A-shares.
//!
//! Upstream sources hand back loosely-typed rows (`Row`): field names and
//! formats vary across providers and over time, so nothing here is typed
//! beyond "a JSON object". The scorers read rows through
//! [`crate::normalize`].
//!
//! # Data Sources
//! - **eastmoney** (default): public push2 / push2ex / push2his / datacenter
//!   endpoints, no key required

mod eastmoney;
mod fallback;
mod provider;

pub use eastmoney::{EastmoneyEndpoints, EastmoneyProvider};
pub use fallback::{fetch_into, fetch_rows, first_non_empty, FetchOutcome, Provenance};
pub use provider::{BoardKind, FundFlowWindow, MarketDataProvider, NorthboundSource, ProviderError};

use serde::{Deserialize, Serialize};

use crate::normalize::{fields, resolve_number};

/// One loosely-typed upstream record.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Daily Bar
// ============================================================================

/// The slice of a daily history row the scanner needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub open: f64,
    pub close: f64,
    pub volume: f64,
}

impl DailyBar {
    /// Read a bar from a history row; missing fields become 0.
    pub fn from_row(row: &Row) -> Self {
        Self {
            open: resolve_number(row, fields::HIST_OPEN, 0.0),
            close: resolve_number(row, fields::HIST_CLOSE, 0.0),
            volume: resolve_number(row, fields::HIST_VOLUME, 0.0),
        }
    }

    /// Check if this is a bearish candle
    pub fn is_bearish(&self) -> bool {
        self.open > self.close
    }
}

// ============================================================================
// Tests
// ============================================================================
