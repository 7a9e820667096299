//! Live data service binary
//!
//! Entry point for the `lkv` command: initialise, validate and start the
//! live market data subscription service.

mod service;
mod shutdown;

use anyhow::{Context, Result};
use cli::{Cli, Commands};
use config::{generate_default_config, load_config, save_config, validate_config, MasterConfig, ValidationReport};
use observability::{init_default_logging, init_logging, init_metrics, LiveDataMetrics, LogFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start { config, metrics_port } => start_command(config, metrics_port).await,
        Commands::Validate { config } => {
            init_default_logging("lkv")?;
            validate_command(config).await
        }
        Commands::Init { output } => {
            init_default_logging("lkv")?;
            init_command(output).await
        }
    }
}

async fn start_command(config_path: PathBuf, metrics_port: Option<u16>) -> Result<()> {
    let config = load_config(&config_path)?;

    let format = LogFormat::parse(&config.service.log_format).unwrap_or_default();
    init_logging(&config.service.name, format)?;
    info!(path = ?config_path, "Executing 'start' command");

    let report = validate_config(&config);
    log_report(&report);
    if !report.is_valid() {
        anyhow::bail!("Cannot start service due to configuration errors");
    }

    let metrics_config = config.metrics_or_default();
    let port = metrics_port.or(metrics_config.enabled.then_some(metrics_config.port));
    match port {
        Some(port) => init_metrics(port).context("Failed to start metrics exporter")?,
        None => debug!("Metrics exporter disabled"),
    }

    service::run(config, LiveDataMetrics::new()).await
}

fn log_report(report: &ValidationReport) {
    if !report.warnings.is_empty() {
        warn!("Configuration warnings:");
        for warning in &report.warnings {
            warn!(field = %warning.field, message = %warning.message);
        }
    }

    for default in &report.defaults_applied {
        debug!(field = %default.field, value = %default.value, "Default applied");
    }

    if !report.is_valid() {
        error!(
            error_count = report.errors.len(),
            "Configuration validation failed"
        );
        for err in &report.errors {
            error!("{}", err);
        }
    }
}

async fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    print_summary(&config);
    Ok(())
}

fn print_summary(config: &MasterConfig) {
    let live_data = config.live_data_or_default();
    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!("Default normalization: {}", live_data.default_normalization);
    println!("Availability entries: {}", config.availability.len());
    println!("Startup subscriptions: {}", config.subscriptions.len());
    println!("Snapshot timeout: {} ms", live_data.snapshot_timeout_ms);
}

async fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("This configuration includes:");
    println!("  - {} availability entries", config.availability.len());
    println!("  - {} startup subscriptions", config.subscriptions.len());
    println!("  - Simulated feed settings");
    println!();
    println!("Next steps:");
    println!("  1. Edit the configuration file to customize settings");
    println!(
        "  2. Run 'lkv validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  3. Run 'lkv start --config {:?}' to start the service",
        output_path
    );

    Ok(())
}
