use crate::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MasterConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());
    parse_config(&content)
}

/// Parse configuration text after environment variable substitution
pub fn parse_config(content: &str) -> Result<MasterConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    let config: MasterConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!("Configuration loaded successfully");
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> MasterConfig {
    use defaults::*;

    MasterConfig {
        service: ServiceConfig {
            name: "lkv".to_string(),
            log_format: default_log_format(),
        },
        live_data: Some(LiveDataConfig::default()),
        availability: vec![
            AvailabilityEntry {
                ticker: "ACTIVFEED_TICKER~AAPL.".to_string(),
                normalization: None,
                feed_ids: vec![],
            },
            AvailabilityEntry {
                ticker: "ACTIVFEED_TICKER~MSFT.".to_string(),
                normalization: None,
                feed_ids: vec![],
            },
        ],
        subscriptions: vec![
            SubscriptionEntry {
                ticker: "ACTIVFEED_TICKER~AAPL.".to_string(),
                value_name: default_value_name(),
            },
            SubscriptionEntry {
                ticker: "ACTIVFEED_TICKER~MSFT.".to_string(),
                value_name: default_value_name(),
            },
        ],
        metrics: Some(MetricsConfig::default()),
        simulation: Some(SimulationConfig::default()),
    }
}

#[instrument]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &MasterConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}
