use serde::{Deserialize, Serialize};

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Top-level configuration file
///
/// Optional sections fall back to their defaults; validation records which
/// ones did in the report's `defaults_applied`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterConfig {
    pub service: ServiceConfig,
    #[serde(rename = "live_data")]
    #[serde(default)]
    pub live_data: Option<LiveDataConfig>,
    /// Fixed availability table: tickers and the feed lines that back them
    #[serde(default)]
    pub availability: Vec<AvailabilityEntry>,
    /// Keys subscribed at startup
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionEntry>,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
}

impl MasterConfig {
    pub fn live_data_or_default(&self) -> LiveDataConfig {
        self.live_data.clone().unwrap_or_default()
    }

    pub fn metrics_or_default(&self) -> MetricsConfig {
        self.metrics.clone().unwrap_or_default()
    }

    pub fn simulation_or_default(&self) -> SimulationConfig {
        self.simulation.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    /// One of: pretty, json, compact
    #[serde(rename = "log_format")]
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveDataConfig {
    /// Normalization rule set used when a key does not name one
    #[serde(rename = "default_normalization")]
    #[serde(default = "default_normalization")]
    pub default_normalization: String,
    /// Upper bound on snapshot initialisation waits
    #[serde(rename = "snapshot_timeout_ms")]
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,
    /// How often the service takes and logs a snapshot
    #[serde(rename = "snapshot_interval_ms")]
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    #[serde(rename = "resubscribe_channel_capacity")]
    #[serde(default = "default_resubscribe_channel_capacity")]
    pub resubscribe_channel_capacity: usize,
}

impl Default for LiveDataConfig {
    fn default() -> Self {
        Self {
            default_normalization: default_normalization(),
            snapshot_timeout_ms: default_snapshot_timeout_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            resubscribe_channel_capacity: default_resubscribe_channel_capacity(),
        }
    }
}

/// One row of the fixed availability table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AvailabilityEntry {
    /// Ticker in `SCHEME~value` form
    pub ticker: String,
    /// Overrides `live_data.default_normalization`
    #[serde(default)]
    pub normalization: Option<String>,
    /// Identifiers sent to the feed; defaults to the ticker itself
    #[serde(rename = "feed_ids")]
    #[serde(default)]
    pub feed_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionEntry {
    /// Ticker in `SCHEME~value` form
    pub ticker: String,
    #[serde(rename = "value_name")]
    #[serde(default = "default_value_name")]
    pub value_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(rename = "tick_interval_ms")]
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(rename = "response_delay_ms")]
    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(rename = "initial_price")]
    #[serde(default = "default_initial_price")]
    pub initial_price: f64,
    #[serde(default = "default_volatility")]
    pub volatility: f64,
    /// Identifier values the simulated feed rejects
    #[serde(rename = "failing_tickers")]
    #[serde(default)]
    pub failing_tickers: Vec<String>,
    /// Period of simulated normalization rule refreshes; 0 disables them
    #[serde(rename = "rules_refresh_secs")]
    #[serde(default)]
    pub rules_refresh_secs: u64,
    /// Schemes named in each simulated refresh
    #[serde(rename = "rules_refresh_schemes")]
    #[serde(default)]
    pub rules_refresh_schemes: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            response_delay_ms: default_response_delay_ms(),
            seed: default_seed(),
            initial_price: default_initial_price(),
            volatility: default_volatility(),
            failing_tickers: Vec::new(),
            rules_refresh_secs: 0,
            rules_refresh_schemes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
service:
  name: "lkv-eu"
  log_format: json

live_data:
  default_normalization: "OpenGamma"
  snapshot_timeout_ms: 250

availability:
  - ticker: "ACTIVFEED_TICKER~AAPL."
  - ticker: "BLOOMBERG_TICKER~VOD LN Equity"
    normalization: "Bloomberg"
    feed_ids: ["BLOOMBERG_BUID~EQ0010160500001000"]

subscriptions:
  - ticker: "ACTIVFEED_TICKER~AAPL."
  - ticker: "BLOOMBERG_TICKER~VOD LN Equity"
    value_name: "Bid"

metrics:
  enabled: true

simulation:
  tick_interval_ms: 100
  failing_tickers: ["DELISTED"]
  rules_refresh_secs: 30
  rules_refresh_schemes: ["ACTIVFEED_TICKER"]
"#;

        let config: MasterConfig = serde_yaml::from_str(yaml).expect("config parses");

        assert_eq!(config.service.name, "lkv-eu");
        assert_eq!(config.service.log_format, "json");

        let live_data = config.live_data_or_default();
        assert_eq!(live_data.snapshot_timeout_ms, 250);
        assert_eq!(live_data.snapshot_interval_ms, default_snapshot_interval_ms());

        assert_eq!(config.availability.len(), 2);
        assert!(config.availability[0].feed_ids.is_empty());
        assert_eq!(config.availability[1].normalization.as_deref(), Some("Bloomberg"));

        assert_eq!(config.subscriptions[0].value_name, "Market_Value");
        assert_eq!(config.subscriptions[1].value_name, "Bid");

        let metrics = config.metrics_or_default();
        assert!(metrics.enabled);
        assert_eq!(metrics.port, 9090);

        let simulation = config.simulation_or_default();
        assert_eq!(simulation.tick_interval_ms, 100);
        assert_eq!(simulation.seed, 42);
        assert_eq!(simulation.rules_refresh_schemes, vec!["ACTIVFEED_TICKER".to_string()]);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: MasterConfig = serde_yaml::from_str("service:\n  name: lkv\n").expect("config parses");

        assert_eq!(config.service.log_format, "pretty");
        assert!(config.live_data.is_none());
        assert!(config.availability.is_empty());
        assert_eq!(config.live_data_or_default().default_normalization, "OpenGamma");
        assert!(!config.metrics_or_default().enabled);
    }
}
