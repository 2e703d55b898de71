//! Shortline Common - Shared configuration, logging and error types.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.shortline/config.json` + env overrides)
//! - Logging setup with noise filtering
//! - The shared error type

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    Config, DecisionConfig, ObservabilityConfig, ProviderConfig, RiskConfig, RiskTier,
    ServerConfig,
};
pub use error::{Error, Result, ResultExt};
