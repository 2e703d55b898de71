//! Shortline - short-term A-share decision engine.
//!
//! Every subcommand prints its payload as pretty JSON on stdout; logs go to
//! stderr. `serve` exposes the same operations over HTTP.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use shortline::{ShortlineService, ShortlineToolkit};
use shortline_common::config::Config;
use shortline_common::logging::init_logging_with_exclusions;

#[derive(Parser, Debug)]
#[command(name = "shortline")]
#[command(version)]
#[command(about = "Short-term A-share sentiment, sector, scan and capital-flow signals.", long_about = None)]
struct Cli {
    /// Attach debug_info provenance to the payload
    #[arg(long, global = true)]
    debug: bool,

    /// Trade date to evaluate (YYYY-MM-DD); defaults to today
    #[arg(long, global = true, value_parser = parse_date)]
    date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Market sentiment from the limit-up / limit-down pools
    Sentiment,

    /// Strongest sector boards
    Sectors {
        /// Number of sectors to return
        #[arg(long)]
        top: Option<usize>,
    },

    /// Scan for strong stocks
    Scan {
        /// Restrict to these sector names (repeatable or comma-separated)
        #[arg(long, value_delimiter = ',')]
        sector: Vec<String>,

        /// Number of candidates to return
        #[arg(long)]
        top: Option<usize>,
    },

    /// Northbound and main-force capital flow
    CapitalFlow {
        /// Stock code; omit for the whole market
        #[arg(long)]
        symbol: Option<String>,
    },

    /// Fused trading signal
    Signal,

    /// Risk verdict for a sentiment score
    Risk {
        #[arg(long, default_value = "50")]
        score: f64,
    },

    /// Daily text report plus the signal it was rendered from
    Report {
        /// Print only the report text
        #[arg(long)]
        text: bool,
    },

    /// Start the HTTP service
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("invalid date '{raw}': {e}"))
}

fn print_json<T: Serialize>(payload: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(payload).context("Failed to serialize payload")?;
    println!("{text}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_with_env()?;
    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    config.validate()?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::debug!("Shortline v{}", env!("CARGO_PKG_VERSION"));

    let mut toolkit = ShortlineToolkit::new(config);
    if let Some(date) = cli.date {
        toolkit = toolkit.with_trade_date(date);
    }
    let debug = cli.debug;

    match cli.command {
        Commands::Sentiment => print_json(&toolkit.market_sentiment(debug).await),
        Commands::Sectors { top } => print_json(&toolkit.sector_rotation(top, debug).await),
        Commands::Scan { sector, top } => {
            let sectors = (!sector.is_empty()).then_some(sector);
            print_json(
                &toolkit
                    .scan_strong_stocks(sectors.as_deref(), top, debug)
                    .await,
            )
        }
        Commands::CapitalFlow { symbol } => {
            print_json(&toolkit.capital_flow(symbol.as_deref(), debug).await)
        }
        Commands::Signal => print_json(&toolkit.signal(debug).await),
        Commands::Risk { score } => print_json(&toolkit.risk_control(score)),
        Commands::Report { text } => {
            let daily = toolkit.daily_report(debug).await;
            if text {
                println!("{}", daily.report);
                Ok(())
            } else {
                print_json(&daily)
            }
        }
        Commands::Serve { .. } => {
            tracing::info!("Shortline v{}", env!("CARGO_PKG_VERSION"));
            ShortlineService::new(toolkit).start().await
        }
    }
}
