//! # RenderFleet Configuration Validator
//!
//! Loads `config/renderfleet/*.toml` the way the orchestrator does and
//! reports whether the result is usable.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use renderfleet_core::config::{ConfigManager, RenderFleetConfig};
use renderfleet_core::pricing::PricingTable;
use renderfleet_core::Region;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate RenderFleet configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment overlay to apply (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory (default: config/renderfleet)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the resolved configuration as JSON
    Show,

    /// Estimate the cost of a job under the resolved configuration
    Estimate {
        #[arg(long)]
        invocations: u64,
        #[arg(long, default_value_t = 2048)]
        memory_mb: u32,
        #[arg(long, default_value_t = 1000)]
        avg_duration_ms: u64,
        #[arg(long)]
        region: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli).map(|_| ()),
        Some(Commands::Show) => show(&cli),
        Some(Commands::Estimate {
            invocations,
            memory_mb,
            avg_duration_ms,
            region,
        }) => estimate(&cli, *invocations, *memory_mb, *avg_duration_ms, region.as_deref()),
    };

    if let Err(e) = result {
        error!("Configuration validation failed: {e:#}");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn load(cli: &Cli) -> Result<RenderFleetConfig> {
    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
            .with_context(|| format!("loading environment '{}'", cli.environment))?;
    info!(directory = %manager.config_directory().display(), "Configuration loaded");
    Ok(manager.config().clone())
}

fn validate(cli: &Cli) -> Result<RenderFleetConfig> {
    let config = load(cli)?;
    println!("Environment:        {}", cli.environment);
    println!("Max concurrency:    {}", config.dispatch.max_concurrency);
    println!("Max retries:        {}", config.dispatch.max_retries);
    println!(
        "Invocation timeout: {}ms",
        config.timeouts.invocation_timeout_ms
    );
    println!("Job timeout:        {}s", config.timeouts.job_timeout_seconds);
    println!("Default region:     {}", config.storage.default_region);
    println!("Configuration is valid");
    Ok(config)
}

fn show(cli: &Cli) -> Result<()> {
    let config = load(cli)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn estimate(
    cli: &Cli,
    invocations: u64,
    memory_mb: u32,
    avg_duration_ms: u64,
    region: Option<&str>,
) -> Result<()> {
    let config = load(cli)?;
    let region = Region::new(region.unwrap_or(&config.storage.default_region));
    let cost = PricingTable::builtin(&config.pricing)
        .estimate(invocations, memory_mb, avg_duration_ms, &region)
        .with_context(|| format!("estimating cost in {region}"))?;
    println!("{}", serde_json::to_string_pretty(&cost)?);
    Ok(())
}
