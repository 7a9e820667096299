use crate::*;
use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

const TICKER_PATTERN: &str = r"^[^~\s][^~]*~[^~]+$";
const LOG_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Live data: {message}")]
    InvalidLiveData { message: String },

    #[error("Invalid ticker '{ticker}': {message}")]
    InvalidTicker { ticker: String, message: String },

    #[error("Duplicate availability entry for ticker '{ticker}'")]
    DuplicateAvailability { ticker: String },

    #[error("Simulation: {message}")]
    InvalidSimulation { message: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("{field} must be a positive float")]
    InvalidPositiveFloat { field: String },

    #[error("Metrics port must be non-zero when metrics are enabled")]
    InvalidMetricsPort,

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &MasterConfig) -> ValidationReport {
    let mut report = ValidationReport::new();
    let ticker_regex = Regex::new(TICKER_PATTERN).ok();

    validate_service(&config.service, &mut report);

    match &config.live_data {
        Some(live_data) => validate_live_data(live_data, &mut report),
        None => report.add_default("live_data", "built-in defaults"),
    }

    let available = validate_availability(&config.availability, ticker_regex.as_ref(), &mut report);
    validate_subscriptions(&config.subscriptions, &available, ticker_regex.as_ref(), &mut report);

    match &config.metrics {
        Some(metrics) => validate_metrics(metrics, &mut report),
        None => report.add_default("metrics.enabled", "false"),
    }

    match &config.simulation {
        Some(simulation) => validate_simulation(simulation, &mut report),
        None => report.add_default("simulation", "built-in defaults"),
    }

    report
}

fn validate_service(service: &ServiceConfig, report: &mut ValidationReport) {
    if service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    } else {
        check_env_placeholder("service.name", &service.name, report);
    }

    if !LOG_FORMATS.contains(&service.log_format.as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(service.log_format.clone()));
    }
}

fn validate_live_data(live_data: &LiveDataConfig, report: &mut ValidationReport) {
    if live_data.default_normalization.trim().is_empty() {
        report.add_error(ValidationError::InvalidLiveData {
            message: "default_normalization must not be empty".to_string(),
        });
    } else {
        check_env_placeholder("live_data.default_normalization", &live_data.default_normalization, report);
    }

    if live_data.snapshot_interval_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "live_data.snapshot_interval_ms".to_string(),
        });
    }

    if live_data.resubscribe_channel_capacity == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "live_data.resubscribe_channel_capacity".to_string(),
        });
    }

    if live_data.snapshot_timeout_ms == 0 {
        report.add_warning(
            "live_data.snapshot_timeout_ms",
            "Snapshots will not wait for missing values",
        );
    } else if live_data.snapshot_timeout_ms >= live_data.snapshot_interval_ms {
        report.add_warning(
            "live_data.snapshot_timeout_ms",
            "Timeout is not shorter than the snapshot interval; snapshots may overlap",
        );
    }
}

/// Validates the table and returns the tickers it makes available
fn validate_availability(
    entries: &[AvailabilityEntry],
    ticker_regex: Option<&Regex>,
    report: &mut ValidationReport,
) -> HashSet<String> {
    let mut seen = HashSet::new();

    for entry in entries {
        validate_ticker(&entry.ticker, ticker_regex, report);
        for feed_id in &entry.feed_ids {
            validate_ticker(feed_id, ticker_regex, report);
        }

        if let Some(normalization) = &entry.normalization {
            if normalization.trim().is_empty() {
                report.add_error(ValidationError::InvalidTicker {
                    ticker: entry.ticker.clone(),
                    message: "normalization must not be empty when set".to_string(),
                });
            }
        }

        if !seen.insert(entry.ticker.clone()) {
            report.add_error(ValidationError::DuplicateAvailability {
                ticker: entry.ticker.clone(),
            });
        }
    }

    seen
}

fn validate_subscriptions(
    subscriptions: &[SubscriptionEntry],
    available: &HashSet<String>,
    ticker_regex: Option<&Regex>,
    report: &mut ValidationReport,
) {
    if subscriptions.is_empty() {
        report.add_warning("subscriptions", "No startup subscriptions configured");
    }

    for subscription in subscriptions {
        validate_ticker(&subscription.ticker, ticker_regex, report);

        if subscription.value_name.trim().is_empty() {
            report.add_error(ValidationError::InvalidTicker {
                ticker: subscription.ticker.clone(),
                message: "value_name must not be empty".to_string(),
            });
        }

        if !available.contains(&subscription.ticker) {
            report.add_warning(
                &format!("subscriptions.{}", subscription.ticker),
                "Ticker is not in the availability table; resolved from its own identifier",
            );
        }
    }
}

fn validate_ticker(ticker: &str, ticker_regex: Option<&Regex>, report: &mut ValidationReport) {
    let Some(re) = ticker_regex else {
        return;
    };
    if !re.is_match(ticker) {
        report.add_error(ValidationError::InvalidTicker {
            ticker: ticker.to_string(),
            message: "must be in SCHEME~value form".to_string(),
        });
    }
}

fn validate_metrics(metrics: &MetricsConfig, report: &mut ValidationReport) {
    if metrics.enabled && metrics.port == 0 {
        report.add_error(ValidationError::InvalidMetricsPort);
    }
}

fn validate_simulation(simulation: &SimulationConfig, report: &mut ValidationReport) {
    if simulation.tick_interval_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "simulation.tick_interval_ms".to_string(),
        });
    }

    if simulation.initial_price <= 0.0 || !simulation.initial_price.is_finite() {
        report.add_error(ValidationError::InvalidPositiveFloat {
            field: "simulation.initial_price".to_string(),
        });
    }

    if !(0.0..1.0).contains(&simulation.volatility) {
        report.add_error(ValidationError::InvalidSimulation {
            message: format!("volatility must be in [0, 1), got {}", simulation.volatility),
        });
    }

    if simulation.rules_refresh_secs > 0 && simulation.rules_refresh_schemes.is_empty() {
        report.add_warning(
            "simulation.rules_refresh_schemes",
            "Rules refresh is enabled but names no schemes",
        );
    }
}

fn check_env_placeholder(field: &str, value: &str, report: &mut ValidationReport) {
    if let Ok(true) = has_unresolved_env_vars(value) {
        report.add_error(ValidationError::InvalidEnvVar {
            var: value.to_string(),
            message: format!("unresolved placeholder in {}", field),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn valid_config() -> MasterConfig {
        generate_default_config()
    }

    #[test]
    fn test_default_sections_recorded() {
        let mut config = valid_config();
        config.live_data = None;
        config.metrics = None;
        config.simulation = None;

        let report = validate_config(&config);
        assert!(report.is_valid());
        let fields: Vec<&str> = report.defaults_applied.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["live_data", "metrics.enabled", "simulation"]);
    }

    #[test]
    fn test_invalid_service() {
        let mut config = valid_config();
        config.service.name = " ".to_string();
        config.service.log_format = "xml".to_string();

        let report = validate_config(&config);
        assert_eq!(report.errors.len(), 2);
        assert_matches!(report.errors[0], ValidationError::MissingServiceName);
        assert_matches!(&report.errors[1], ValidationError::InvalidLogFormat(f) if f == "xml");
    }

    #[test]
    fn test_invalid_tickers_and_duplicates() {
        let mut config = valid_config();
        config.availability.push(AvailabilityEntry {
            ticker: "NOSCHEME".to_string(),
            normalization: None,
            feed_ids: vec![],
        });
        config.availability.push(config.availability[0].clone());

        let report = validate_config(&config);
        assert_eq!(report.errors.len(), 2);
        assert_matches!(&report.errors[0], ValidationError::InvalidTicker { ticker, .. } if ticker == "NOSCHEME");
        assert_matches!(&report.errors[1], ValidationError::DuplicateAvailability { .. });
    }

    #[test]
    fn test_unavailable_subscription_warns() {
        let mut config = valid_config();
        config.subscriptions.push(SubscriptionEntry {
            ticker: "RIC~VOD.L".to_string(),
            value_name: "Market_Value".to_string(),
        });

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.field == "subscriptions.RIC~VOD.L"));
    }

    #[test]
    fn test_invalid_live_data_and_simulation() {
        let mut config = valid_config();
        config.live_data = Some(LiveDataConfig {
            snapshot_interval_ms: 0,
            resubscribe_channel_capacity: 0,
            ..LiveDataConfig::default()
        });
        config.simulation = Some(SimulationConfig {
            tick_interval_ms: 0,
            initial_price: -1.0,
            volatility: 2.0,
            ..SimulationConfig::default()
        });

        let report = validate_config(&config);
        assert_eq!(report.errors.len(), 5);
    }

    #[test]
    fn test_unresolved_env_var() {
        let mut config = valid_config();
        config.service.name = "${LKV_TEST_UNSET_NAME}".to_string();

        let report = validate_config(&config);
        assert_matches!(&report.errors[0], ValidationError::InvalidEnvVar { .. });
    }
}
