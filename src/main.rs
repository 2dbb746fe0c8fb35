// opswatch - Main Entry Point
//
// Runs the monitoring core against the simulated backend:
// - CLI interface
// - Dashboard orchestrator (change multiplexer + per-domain aggregators)
// - Rate limiter cleanup sweep
// - Metrics and snapshot HTTP endpoints

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opswatch::config::Config;
use opswatch::csrf::TokenLifecycleManager;
use opswatch::dashboard::{DashboardOrchestrator, OrchestratorSettings};
use opswatch::metrics;
use opswatch::metrics_server;
use opswatch::rate_limit::WindowedRateLimiter;
use opswatch::realtime::InMemoryChangeBus;
use opswatch::simulation::{self, SyntheticSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// opswatch: real-time monitoring and throttling core
#[derive(Parser, Debug)]
#[command(name = "opswatch")]
#[command(author = "Opswatch Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Real-time monitoring and throttling core for operations dashboards", long_about = None)]
struct Args {
    /// Path to the configuration file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dashboard against the simulated backend
    Run {
        /// Interval between simulated change notifications
        #[arg(long, default_value_t = 2000)]
        burst_interval_ms: u64,

        /// Exit after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run admission checks against the rate limiter
    Limit {
        /// Action name (selects the action policy)
        #[arg(long)]
        action: String,

        /// Actor identifier
        #[arg(long)]
        actor: String,

        /// Resource identifier
        #[arg(long)]
        resource: String,

        /// Number of attempts
        #[arg(long, default_value_t = 1)]
        times: u32,

        /// Print the limiter report as JSON afterwards
        #[arg(long)]
        report: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    };

    // `config check` reports the error itself
    let config = match (config, &args.command) {
        (Ok(config), _) => config,
        (Err(e), Some(Commands::Config { action: ConfigAction::Check })) => {
            eprintln!("Configuration invalid: {:#}", e);
            std::process::exit(1);
        }
        (Err(e), _) => return Err(e),
    };

    init_tracing(&config, args.verbose)?;

    match args.command {
        Some(Commands::Run {
            burst_interval_ms,
            duration_secs,
        }) => run(config, burst_interval_ms, duration_secs).await?,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Check => println!("Configuration OK"),
        },
        Some(Commands::Limit {
            action,
            actor,
            resource,
            times,
            report,
        }) => limit(config, &action, &actor, &resource, times, report)?,
        None => {
            info!("No command specified. Use \"opswatch --help\" for usage.");
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber from the logging section
fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.log_level()?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

/// Run the orchestrator until Ctrl-C or the optional deadline
async fn run(config: Config, burst_interval_ms: u64, duration_secs: Option<u64>) -> Result<()> {
    info!("opswatch v{} starting...", env!("CARGO_PKG_VERSION"));
    metrics::init().context("Failed to initialize metrics")?;

    let tokens = TokenLifecycleManager::from_config(&config.csrf);
    info!(header = tokens.header_name(), "Session token ready");

    let limiter = WindowedRateLimiter::new(config.rate_limit.clone());
    let cleanup = limiter.spawn_cleanup();

    let bus = Arc::new(InMemoryChangeBus::new());
    let orchestrator = DashboardOrchestrator::new(
        Arc::new(SyntheticSource::new()),
        bus.clone(),
        OrchestratorSettings::from_config(&config.monitoring),
    );

    if let Err(e) = orchestrator.start().await {
        warn!("Dashboard running without live updates: {}", e);
    }

    let server = config.metrics.enabled.then(|| {
        let board = orchestrator.board();
        let port = config.metrics.port;
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(port, board).await {
                error!("Metrics server failed: {:#}", e);
            }
        })
    });

    let activity = simulation::spawn_activity(bus, Duration::from_millis(burst_interval_ms.max(1)));

    match duration_secs {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
        }
    }

    info!("Shutting down...");
    activity.cancel().await;
    orchestrator.shutdown().await;
    cleanup.cancel().await;
    if let Some(server) = server {
        server.abort();
    }
    tokens.clear_token();

    let board = orchestrator.board();
    println!("Overall status: {}", board.overall_status());
    for snapshot in board.all() {
        println!(
            "  {:<15} {:<9} {}",
            snapshot.domain.as_str(),
            snapshot.status.as_str(),
            snapshot.last_updated_label(chrono::Utc::now())
        );
    }

    Ok(())
}

/// Run `times` admission checks for one key and print each decision
fn limit(config: Config, action: &str, actor: &str, resource: &str, times: u32, report: bool) -> Result<()> {
    let limiter = WindowedRateLimiter::new(config.rate_limit);
    let policy = limiter.policy_for(action);
    println!(
        "Policy for '{}': {} requests per {}s",
        action,
        policy.max_requests,
        policy.window.as_secs()
    );

    for attempt in 1..=times {
        let decision = limiter.check_action(action, actor, resource);
        match decision.wait_message() {
            None => println!("attempt {}: allowed (count {})", attempt, decision.count),
            Some(message) => println!("attempt {}: denied. {}", attempt, message),
        }
    }

    if report {
        let report = limiter.report();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    }

    Ok(())
}
