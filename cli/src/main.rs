//! MockBank CLI
//!
//! Seeds a simulated population and drives the simulation either for a
//! fixed number of cycles on a stepped clock or on a wall-clock timer.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use mockbank_core::simulation::{IntervalTicker, SchedulerOptions};
use mockbank_core::{
    Clock, CycleSummary, ManualClock, MemoryStore, Scheduler, Simulation, SimulatorConfig,
    SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mockbank", version, about = "Fictional bank backend simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Common {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Users to seed before the first cycle
    #[arg(long)]
    users: Option<usize>,

    /// Months of backfilled history per user
    #[arg(long)]
    history_months: Option<u32>,

    /// Seed key for deterministic mode
    #[arg(long)]
    seed_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a fixed number of cycles on a simulated clock
    Run {
        #[command(flatten)]
        common: Common,

        #[arg(long, default_value_t = 12)]
        cycles: u64,

        /// Simulated start instant (RFC 3339); defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,
    },
    /// Run cycles on a wall-clock interval until interrupted
    Serve {
        #[command(flatten)]
        common: Common,

        #[arg(long)]
        interval_secs: Option<u64>,

        #[arg(long)]
        max_cycles: Option<u64>,
    },
}

fn load_config(common: &Common) -> Result<SimulatorConfig> {
    let mut config = match &common.config {
        Some(path) => SimulatorConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulatorConfig::default(),
    }
    .with_env_override();

    if let Some(users) = common.users {
        config.simulation.population = users;
    }
    if let Some(months) = common.history_months {
        config.simulation.history_months = months;
    }
    if let Some(key) = &common.seed_key {
        config.simulation.seed_key = key.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("mockbank_core={log_level},mockbank={log_level}")))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    Ok(())
}

fn print_summary(summary: &CycleSummary) {
    match serde_json::to_string(summary) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::error!(error = %err, "failed to serialize cycle summary"),
    }
}

fn build(config: SimulatorConfig, clock: Arc<dyn Clock>) -> Result<Simulation<MemoryStore>> {
    let population = config.simulation.population;
    let months = config.simulation.history_months;
    let simulation = Simulation::new(MemoryStore::new(), clock, config)?;
    let report = simulation.seed_population(population, months)?;
    tracing::info!(
        users = report.users,
        transactions = report.transactions,
        "population ready"
    );
    Ok(simulation)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            common,
            cycles,
            start,
        } => {
            let config = load_config(&common)?;
            init_tracing(&config.simulation.log_level)?;

            let step = Duration::seconds(config.simulation.interval_secs as i64);
            let clock = ManualClock::new(start.unwrap_or_else(Utc::now));
            let simulation = build(config, Arc::new(clock.clone()))?;

            for _ in 0..cycles {
                clock.advance(step);
                let summary = simulation.run_cycle()?;
                print_summary(&summary);
            }
            println!("{}", serde_json::to_string_pretty(&simulation.stats()?)?);
        }
        Command::Serve {
            common,
            interval_secs,
            max_cycles,
        } => {
            let mut config = load_config(&common)?;
            if let Some(secs) = interval_secs {
                config.simulation.interval_secs = secs;
            }
            config.validate()?;
            init_tracing(&config.simulation.log_level)?;

            let period = std::time::Duration::from_secs(config.simulation.interval_secs);
            let simulation = Arc::new(build(config, Arc::new(SystemClock))?);
            let scheduler = Scheduler::start_with(
                Arc::clone(&simulation),
                IntervalTicker::new(period),
                SchedulerOptions { max_cycles },
                print_summary,
            );

            let stop = scheduler.stop_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping after the current cycle");
                    stop.stop();
                }
            });

            let report = scheduler.join().await;
            tracing::info!(
                completed = report.cycles_completed,
                failed = report.cycles_failed,
                "scheduler finished"
            );
            println!("{}", serde_json::to_string_pretty(&simulation.stats()?)?);
        }
    }

    Ok(())
}
