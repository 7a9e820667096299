//! Prometheus metrics infrastructure
//!
//! This module provides the Prometheus exporter and the metric set recorded
//! by the live data subscription manager. Metrics are no-ops until a
//! recorder is installed, so tests and tools can create them freely.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics::{Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const SUBSCRIBE_REQUESTS: &str = "livedata_subscribe_requests_total";
pub const RESUBSCRIBE_REQUESTS: &str = "livedata_resubscribe_requests_total";
pub const CANCEL_REQUESTS: &str = "livedata_cancel_requests_total";
pub const SUBSCRIPTION_FAILURES: &str = "livedata_subscription_failures_total";
pub const TICKS: &str = "livedata_ticks_total";
pub const UNROUTED_TICKS: &str = "livedata_unrouted_ticks_total";
pub const REQUESTED_SUBSCRIPTIONS: &str = "livedata_requested_subscriptions";
pub const ACTIVE_VALUE_SUBSCRIPTIONS: &str = "livedata_active_value_subscriptions";
pub const SNAPSHOT_INIT_SECONDS: &str = "livedata_snapshot_init_seconds";

/// Initialize the Prometheus metrics exporter
///
/// This starts an HTTP listener on the specified port that exposes metrics
/// at the `/metrics` endpoint.
///
/// # Example
///
/// ```ignore
/// observability::metrics::init_metrics(9090)?;
/// // Metrics available at http://localhost:9090/metrics
/// ```
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    describe_live_data_metrics();
    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

fn describe_live_data_metrics() {
    describe_counter!(SUBSCRIBE_REQUESTS, "Feed specs sent to the feed in subscribe requests");
    describe_counter!(RESUBSCRIBE_REQUESTS, "Feed specs re-requested after scheme changes");
    describe_counter!(CANCEL_REQUESTS, "Fully-qualified streams cancelled at the feed");
    describe_counter!(SUBSCRIPTION_FAILURES, "Failed subscription responses");
    describe_counter!(TICKS, "Ticks routed into the last-known-value store");
    describe_counter!(UNROUTED_TICKS, "Ticks for streams with no subscribers");
    describe_gauge!(REQUESTED_SUBSCRIPTIONS, "Subscriptions holding demand");
    describe_gauge!(ACTIVE_VALUE_SUBSCRIPTIONS, "Value subscriptions on active feed lines");
    describe_histogram!(SNAPSHOT_INIT_SECONDS, "Time spent waiting in snapshot init");
}

/// Metrics recorded by the subscription manager
///
/// # Example
///
/// ```ignore
/// let metrics = LiveDataMetrics::new();
/// metrics.subscribe_requested(3);
/// metrics.set_subscription_counts(3, 5);
/// ```
#[derive(Clone)]
pub struct LiveDataMetrics {
    subscribe_requests: Counter,
    resubscribe_requests: Counter,
    cancel_requests: Counter,
    subscription_failures: Counter,
    ticks: Counter,
    unrouted_ticks: Counter,
    requested_subscriptions: Gauge,
    active_value_subscriptions: Gauge,
    snapshot_init: Histogram,
}

impl LiveDataMetrics {
    pub fn new() -> Self {
        Self {
            subscribe_requests: counter!(SUBSCRIBE_REQUESTS),
            resubscribe_requests: counter!(RESUBSCRIBE_REQUESTS),
            cancel_requests: counter!(CANCEL_REQUESTS),
            subscription_failures: counter!(SUBSCRIPTION_FAILURES),
            ticks: counter!(TICKS),
            unrouted_ticks: counter!(UNROUTED_TICKS),
            requested_subscriptions: gauge!(REQUESTED_SUBSCRIPTIONS),
            active_value_subscriptions: gauge!(ACTIVE_VALUE_SUBSCRIPTIONS),
            snapshot_init: histogram!(SNAPSHOT_INIT_SECONDS),
        }
    }

    pub fn subscribe_requested(&self, specs: usize) {
        self.subscribe_requests.increment(specs as u64);
    }

    pub fn resubscribe_requested(&self, specs: usize) {
        self.resubscribe_requests.increment(specs as u64);
    }

    pub fn cancel_requested(&self, specs: usize) {
        self.cancel_requests.increment(specs as u64);
    }

    pub fn subscription_failed(&self) {
        self.subscription_failures.increment(1);
    }

    pub fn tick_routed(&self) {
        self.ticks.increment(1);
    }

    pub fn tick_unrouted(&self) {
        self.unrouted_ticks.increment(1);
    }

    /// Publish the manager's two headline counts
    pub fn set_subscription_counts(&self, requested: usize, active_values: usize) {
        self.requested_subscriptions.set(requested as f64);
        self.active_value_subscriptions.set(active_values as f64);
    }

    pub fn record_snapshot_init(&self, waited: Duration) {
        self.snapshot_init.record(waited.as_secs_f64());
    }
}

impl Default for LiveDataMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the elapsed time into the snapshot-init histogram on drop
///
/// # Example
///
/// ```ignore
/// {
///     let _timer = SnapshotInitTimer::new(&metrics);
///     snapshot.init(&required, timeout);
/// } // wait time recorded here
/// ```
pub struct SnapshotInitTimer<'a> {
    metrics: &'a LiveDataMetrics,
    start: Instant,
}

impl<'a> SnapshotInitTimer<'a> {
    pub fn new(metrics: &'a LiveDataMetrics) -> Self {
        Self {
            metrics,
            start: Instant::now(),
        }
    }
}

impl Drop for SnapshotInitTimer<'_> {
    fn drop(&mut self) {
        self.metrics.record_snapshot_init(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder() {
        // No recorder installed: every call is a no-op
        let metrics = LiveDataMetrics::new();
        metrics.subscribe_requested(2);
        metrics.cancel_requested(1);
        metrics.set_subscription_counts(2, 4);
        {
            let _timer = SnapshotInitTimer::new(&metrics);
        }
    }
}
