pub fn default_log_format() -> String {
    "pretty".to_string()
}

pub fn default_normalization() -> String {
    "OpenGamma".to_string()
}

pub fn default_snapshot_timeout_ms() -> u64 {
    1000
}

pub fn default_snapshot_interval_ms() -> u64 {
    5000
}

pub fn default_resubscribe_channel_capacity() -> usize {
    64
}

pub fn default_value_name() -> String {
    "Market_Value".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

// Simulation defaults
pub fn default_tick_interval_ms() -> u64 {
    500
}

pub fn default_response_delay_ms() -> u64 {
    50
}

pub fn default_seed() -> u64 {
    42
}

pub fn default_initial_price() -> f64 {
    100.0
}

pub fn default_volatility() -> f64 {
    0.002
}
