//! gaplus - route analytics queries between the live reporting API and the warehouse

mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gaplus_core::analytics::TrendEngine;
use gaplus_core::config::TrendMethod;
use gaplus_core::{Config, Orchestrator};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gaplus",
    version,
    about = "Query GA4 or BigQuery through one router",
    long_about = "Runs analytics queries against whichever source fits best.\n\
                  \n\
                  Each query descriptor is scored for data volume, complexity and date range,\n\
                  then sent to the live reporting API or the warehouse export. Results are\n\
                  cached by content, the other source is tried once on failure, and time\n\
                  series come back with a trend analysis attached.\n\
                  \n\
                  Examples:\n\
                    gaplus query q.json --target 123456        # Run a descriptor\n\
                    gaplus query q.json --target 1 --json      # Full result as JSON\n\
                    gaplus route q.json                        # Explain the routing decision\n\
                    gaplus trend rows.json --metric sessions   # Analyze rows from a file\n\
                    gaplus --mock query q.json --target demo   # Synthetic data\n\
                    gaplus clear-cache --pattern 'query:*'     # Drop cached results\n\
                  \n\
                  Environment Variables:\n\
                    GAPLUS_CONFIG                      # Config file (default: ~/.config/gaplus/config.toml)\n\
                    GAPLUS_REDIS_URL                   # Networked cache (in-process only when unset)\n\
                    GAPLUS_MOCK_MODE                   # Serve every query from the mock source\n\
                    GAPLUS_TARGET_ID                   # Default reporting target\n\
                    GAPLUS_NO_COLOR                    # Disable ANSI colors\n\
                    RUST_LOG                           # Log filter (default: gaplus=info,gaplus_core=info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(long, env = "GAPLUS_CONFIG")]
    config: Option<PathBuf>,

    /// Redis URL for the shared result cache
    #[arg(long, env = "GAPLUS_REDIS_URL")]
    redis_url: Option<String>,

    /// Serve every query from the mock source
    #[arg(long, env = "GAPLUS_MOCK_MODE")]
    mock: bool,

    /// Never route to the warehouse
    #[arg(long)]
    no_warehouse: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "GAPLUS_JSON_LOGS")]
    json_logs: bool,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, env = "GAPLUS_NO_COLOR")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a query descriptor (JSON file) against a target
    Query {
        /// Descriptor file
        descriptor: PathBuf,
        /// Reporting target (property) ID
        #[arg(long, short = 't', env = "GAPLUS_TARGET_ID")]
        target: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the routing decision for a descriptor without running it
    Route {
        /// Descriptor file
        descriptor: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Analyze a JSON array of rows (or a saved query result)
    Trend {
        /// Rows file
        rows: PathBuf,
        /// Metric to analyze
        #[arg(long, short = 'm')]
        metric: String,
        /// Column holding the period
        #[arg(long)]
        time_dimension: Option<String>,
        /// Detector: regression or thirds
        #[arg(long, value_parser = ["regression", "thirds"])]
        method: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show source availability and routing weights
    RoutingStats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show cache counters and backend health
    CacheStats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop cached entries matching a glob pattern
    ClearCache {
        /// Key pattern (`*` and `?` wildcards)
        #[arg(long, default_value = "query:*")]
        pattern: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.redis_url {
        config.cache.redis_url = Some(url);
    }
    if cli.mock {
        config.routing.mock_mode = true;
    }
    if cli.no_warehouse {
        config.routing.warehouse_enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    let no_color = cli.no_color;

    match cli.command {
        Command::Query {
            descriptor,
            target,
            json,
        } => {
            run_query(config, descriptor, target, json, no_color).await?;
        }
        Command::Route { descriptor, json } => {
            run_route(config, descriptor, json, no_color)?;
        }
        Command::Trend {
            rows,
            metric,
            time_dimension,
            method,
            json,
        } => {
            run_trend(config, rows, metric, time_dimension, method, json, no_color)?;
        }
        Command::RoutingStats { json } => {
            let orchestrator = Orchestrator::from_config(config);
            println!(
                "{}",
                cli::format_routing_stats(&orchestrator.get_routing_stats(), json, no_color)
            );
        }
        Command::CacheStats { json } => {
            let orchestrator = Orchestrator::from_config(config);
            let health = orchestrator.cache_health().await;
            println!(
                "{}",
                cli::format_cache_stats(&orchestrator.cache_stats(), &health, json, no_color)
            );
        }
        Command::ClearCache { pattern } => {
            let orchestrator = Orchestrator::from_config(config);
            let removed = orchestrator.clear_cache(&pattern).await;
            println!("✓ Removed {} cached entries matching '{}'", removed, pattern);
        }
    }

    Ok(())
}

/// Logs go to stderr so table and JSON output stay clean on stdout
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gaplus=info,gaplus_core=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_query(
    config: Config,
    descriptor_path: PathBuf,
    target: String,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let descriptor = cli::read_descriptor(&descriptor_path)?;
    let orchestrator = Orchestrator::from_config(config);

    let result = orchestrator.execute(&descriptor, &target).await;
    println!("{}", cli::format_result(&result, json, no_color));

    if let Some(err) = result.error {
        return Err(cli::CliError::QueryFailed {
            kind: err.kind.to_string(),
            message: err.message,
        }
        .into());
    }

    Ok(())
}

fn run_route(config: Config, descriptor_path: PathBuf, json: bool, no_color: bool) -> Result<()> {
    let descriptor = cli::read_descriptor(&descriptor_path)?;
    descriptor
        .validate()
        .with_context(|| format!("Invalid descriptor: {}", descriptor_path.display()))?;

    let orchestrator = Orchestrator::from_config(config);
    let decision = orchestrator.route(&descriptor);
    println!("{}", cli::format_routing_decision(&decision, json, no_color));

    Ok(())
}

fn run_trend(
    config: Config,
    rows_path: PathBuf,
    metric: String,
    time_dimension: Option<String>,
    method: Option<String>,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let rows = cli::read_rows(&rows_path)?;

    let mut trend_config = config.trend;
    if let Some(dim) = time_dimension {
        trend_config.time_dimension = dim;
    }
    match method.as_deref() {
        Some("thirds") => trend_config.method = TrendMethod::Thirds,
        Some("regression") => trend_config.method = TrendMethod::Regression,
        _ => {}
    }

    let report = TrendEngine::new(trend_config).analyze_json(&rows, &metric);
    println!("{}", cli::format_trend_report(&report, json, no_color));

    if let Some(message) = report.error {
        return Err(cli::CliError::TrendFailed { metric, message }.into());
    }

    Ok(())
}
