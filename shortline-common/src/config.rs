//! Configuration management for shortline.
//!
//! Configuration lives in a single file at `~/.shortline/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SHORTLINE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SHORTLINE_LOG_LEVEL` → observability.log_level
//! - `SHORTLINE_LOG_FORMAT` → observability.log_format
//! - `SHORTLINE_DEBUG` → decision.debug (`1`, `true`, `yes`, `on`)
//! - `SHORTLINE_HOST` → server.host
//! - `SHORTLINE_PORT` → server.port
//! - `SHORTLINE_HTTP_TIMEOUT_SECS` → provider.timeout_secs

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".shortline"),
        |dirs| dirs.home_dir().join(".shortline"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Interpret a textual on/off flag the way the debug toggle expects.
pub fn parse_bool_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Decision pipeline defaults
    #[serde(default)]
    pub decision: DecisionConfig,

    /// Market data provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Risk gate tier table
    #[serde(default)]
    pub risk: RiskConfig,

    /// HTTP surface settings
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Ok(Self::load_from(&path)?)
    }

    /// Load configuration from a specific path.
    ///
    /// Read failures surface as `Error::Io`, malformed JSON as `Error::Json`,
    /// both wrapped with the offending path.
    pub fn load_from(path: &Path) -> crate::error::Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable numeric values are ignored and the previous value kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("SHORTLINE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SHORTLINE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(raw) = lookup("SHORTLINE_DEBUG") {
            if parse_bool_flag(&raw) {
                self.decision.debug = true;
            }
        }
        if let Some(host) = lookup("SHORTLINE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SHORTLINE_PORT") {
            if let Ok(p) = port.trim().parse() {
                self.server.port = p;
            }
        }
        if let Some(timeout) = lookup("SHORTLINE_HTTP_TIMEOUT_SECS") {
            if let Ok(t) = timeout.trim().parse() {
                self.provider.timeout_secs = t;
            }
        }
    }

    /// Reject values the decision pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.provider.timeout_secs == 0 {
            return Err(Error::Config("provider.timeout_secs must be positive".into()));
        }
        if self.decision.sector_top_n == 0 {
            return Err(Error::Config("decision.sector_top_n must be positive".into()));
        }
        if self.risk.tiers.is_empty() {
            return Err(Error::Config("risk.tiers must not be empty".into()));
        }
        for tier in &self.risk.tiers {
            if !tier.min_score.is_finite() {
                return Err(Error::Config(format!(
                    "risk tier min_score must be finite, got {}",
                    tier.min_score
                )));
            }
            if !(0.0..=1.0).contains(&tier.max_position) {
                return Err(Error::Config(format!(
                    "risk tier {} max_position {} outside 0-1",
                    tier.min_score, tier.max_position
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets held at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Decision Configuration
// ============================================================================

/// Defaults for the scoring and fusion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// Attach `debug_info` to every payload even when a call does not ask for it
    #[serde(default)]
    pub debug: bool,

    /// Number of sectors returned by the rotation scorer
    #[serde(default = "default_sector_top_n")]
    pub sector_top_n: usize,

    /// Number of candidates returned by a standalone scan
    #[serde(default = "default_scan_top_n")]
    pub scan_top_n: usize,

    /// Number of candidates the fusion engine asks the scanner for
    #[serde(default = "default_signal_candidates")]
    pub signal_candidates: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            debug: false,
            sector_top_n: default_sector_top_n(),
            scan_top_n: default_scan_top_n(),
            signal_candidates: default_signal_candidates(),
        }
    }
}

fn default_sector_top_n() -> usize {
    5
}

fn default_scan_top_n() -> usize {
    10
}

fn default_signal_candidates() -> usize {
    5
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Market data provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// When false no provider is constructed and every scorer serves its
    /// static fallback snapshot.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent to upstream endpoints
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)".into()
}

// ============================================================================
// Risk Configuration
// ============================================================================

/// Tier table consumed by the tiered risk gate.
///
/// Tiers are matched highest `min_score` first; the first tier whose
/// `min_score` is not above the sentiment score applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_risk_tiers")]
    pub tiers: Vec<RiskTier>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            tiers: default_risk_tiers(),
        }
    }
}

/// One band of the risk gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTier {
    /// Lowest sentiment score (inclusive) this tier covers
    pub min_score: f64,
    /// Whether the market is open for new short-term positions
    pub market_filter: bool,
    /// Maximum position as a fraction of capital (0-1)
    pub max_position: f64,
    /// Stop loss in percent (negative)
    pub stop_loss: f64,
    /// Take profit in percent (positive)
    pub take_profit: f64,
    /// Human-readable note
    pub risk_note: String,
}

fn default_risk_tiers() -> Vec<RiskTier> {
    vec![
        RiskTier {
            min_score: 70.0,
            market_filter: true,
            max_position: 0.3,
            stop_loss: -5.0,
            take_profit: 12.0,
            risk_note: "情绪偏强，可适度参与，严格执行止损".into(),
        },
        RiskTier {
            min_score: 50.0,
            market_filter: true,
            max_position: 0.2,
            stop_loss: -5.0,
            take_profit: 10.0,
            risk_note: "情绪中性，轻仓试错，不追高".into(),
        },
        RiskTier {
            min_score: 0.0,
            market_filter: false,
            max_position: 0.0,
            stop_loss: -4.0,
            take_profit: 8.0,
            risk_note: "情绪偏弱，空仓观望".into(),
        },
    ]
}

// ============================================================================
// Server Configuration
// ============================================================================

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4440
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, "pretty");
        assert!(!config.decision.debug);
        assert_eq!(config.decision.sector_top_n, 5);
        assert_eq!(config.decision.scan_top_n, 10);
        assert_eq!(config.decision.signal_candidates, 5);
        assert!(config.provider.enabled);
        assert_eq!(config.server.port, 4440);
        assert_eq!(config.risk.tiers.len(), 3);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config =
            serde_json::from_str(r#"{"decision": {"debug": true}, "server": {"port": 9000}}"#)
                .unwrap();
        assert!(parsed.decision.debug);
        assert_eq!(parsed.decision.scan_top_n, 10);
        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.server.host, "127.0.0.1");
    }

    #[test]
    fn test_observability_aliases() {
        let parsed: ObservabilityConfig =
            serde_json::from_str(r#"{"level": "debug", "format": "json"}"#).unwrap();
        assert_eq!(parsed.log_level, "debug");
        assert_eq!(parsed.log_format, "json");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"provider": {{"timeout_secs": 3, "enabled": false}}}}"#).unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.provider.timeout_secs, 3);
        assert!(!config.provider.enabled);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
        match err {
            Error::WithContext { source, .. } => assert!(matches!(*source, Error::Json(_))),
            other => panic!("expected context-wrapped JSON error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("absent.json")).unwrap_err();

        assert!(err.to_string().starts_with("Failed to read config from"));
        assert_eq!(err.status_code(), 500);
        match err {
            Error::WithContext { source, .. } => assert!(matches!(*source, Error::Io(_))),
            other => panic!("expected context-wrapped IO error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHORTLINE_LOG_LEVEL", "trace"),
            ("SHORTLINE_DEBUG", "Yes"),
            ("SHORTLINE_PORT", "5000"),
            ("SHORTLINE_HTTP_TIMEOUT_SECS", "not-a-number"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.observability.log_level, "trace");
        assert!(config.decision.debug);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.provider.timeout_secs, 15);
    }

    #[test]
    fn test_debug_flag_off_does_not_clear_file_value() {
        let mut config = Config::default();
        config.decision.debug = true;
        config.apply_overrides(|key| (key == "SHORTLINE_DEBUG").then(|| "0".to_string()));
        assert!(config.decision.debug);
    }

    #[test]
    fn test_parse_bool_flag() {
        assert!(parse_bool_flag("1"));
        assert!(parse_bool_flag(" ON "));
        assert!(parse_bool_flag("true"));
        assert!(!parse_bool_flag(""));
        assert!(!parse_bool_flag("no"));
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.provider.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.risk.tiers[0].max_position = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_position 1.5"));

        let mut config = Config::default();
        config.risk.tiers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_risk_tiers_descend() {
        let tiers = RiskConfig::default().tiers;
        assert!(tiers.windows(2).all(|w| w[0].min_score > w[1].min_score));
        assert!(tiers.iter().all(|t| t.stop_loss < 0.0 && t.take_profit > 0.0));
        assert!(tiers.iter().all(|t| (0.0..=1.0).contains(&t.max_position)));
    }
}
