//! Wiring of the live data service
//!
//! Builds the resolver chain and startup keys from configuration, runs the
//! simulated feed, the resubscription controller and the periodic snapshot
//! task until shutdown, then releases every subscription.

use crate::shutdown::ShutdownController;
use anyhow::{Context, Result};
use common::{property_names, ExternalId, ExternalIdBundle, TargetSpec, ValueKey};
use config::MasterConfig;
use market_data::{
    AvailabilityResolver, ChainedResolver, FeedListener, FeedSpec, FixedAvailabilityResolver, MarketDataListener,
    PropertyResolver, ResubscriptionController, SchemeChange, SimulatedFeedClient, SimulationSettings,
    SubscriptionManager,
};
use observability::{LiveDataMetrics, SnapshotInitTimer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resolve configured tickers first, then fall back to the key's own `Id` property
pub fn build_resolver(config: &MasterConfig) -> Result<Arc<dyn AvailabilityResolver>> {
    let default_normalization = config.live_data_or_default().default_normalization;
    let fixed = FixedAvailabilityResolver::new();

    for entry in &config.availability {
        let ticker: ExternalId = entry
            .ticker
            .parse()
            .with_context(|| format!("Invalid availability ticker: {}", entry.ticker))?;
        let identifiers: ExternalIdBundle = if entry.feed_ids.is_empty() {
            ExternalIdBundle::of(ticker.clone())
        } else {
            entry
                .feed_ids
                .iter()
                .map(|id| id.parse::<ExternalId>())
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Invalid feed_ids for {}", entry.ticker))?
        };
        let normalization = entry
            .normalization
            .clone()
            .unwrap_or_else(|| default_normalization.clone());
        fixed.add_ticker(&ticker, FeedSpec::new(normalization, identifiers));
    }

    info!(entries = fixed.len(), "Availability table loaded");
    let chain = ChainedResolver::new()
        .with(Arc::new(fixed))
        .with(Arc::new(PropertyResolver::new(default_normalization)));
    Ok(Arc::new(chain))
}

/// Keys for the configured startup subscriptions
pub fn startup_keys(config: &MasterConfig) -> Result<Vec<ValueKey>> {
    config
        .subscriptions
        .iter()
        .map(|entry| {
            let id: ExternalId = entry
                .ticker
                .parse()
                .with_context(|| format!("Invalid subscription ticker: {}", entry.ticker))?;
            Ok(ValueKey::new(entry.value_name.clone(), TargetSpec::primitive(&id))
                .with_property(property_names::ID, id.to_string()))
        })
        .collect()
}

pub fn simulation_settings(config: &MasterConfig) -> SimulationSettings {
    let simulation = config.simulation_or_default();
    SimulationSettings {
        tick_interval: Duration::from_millis(simulation.tick_interval_ms),
        response_delay: Duration::from_millis(simulation.response_delay_ms),
        failing_tickers: simulation.failing_tickers.into_iter().collect(),
        seed: simulation.seed,
        initial_price: simulation.initial_price,
        volatility: simulation.volatility,
    }
}

/// Logs every notification from the manager
struct LoggingListener;

impl MarketDataListener for LoggingListener {
    fn subscriptions_succeeded(&self, keys: &[ValueKey]) {
        for key in keys {
            info!(key = %key, "Live data available");
        }
    }

    fn subscription_failed(&self, keys: &[ValueKey], reason: &str) {
        for key in keys {
            warn!(key = %key, reason, "Live data unavailable");
        }
    }

    fn subscriptions_stopped(&self, keys: &[ValueKey]) {
        debug!(count = keys.len(), "Live data subscriptions stopped");
    }

    fn values_changed(&self, keys: &[ValueKey]) {
        debug!(count = keys.len(), "Values changed");
    }
}

/// Run the service until Ctrl+C
pub async fn run(config: MasterConfig, metrics: LiveDataMetrics) -> Result<()> {
    let live_data = config.live_data_or_default();
    let resolver = build_resolver(&config)?;
    let keys = startup_keys(&config)?;

    let (client, feed) = SimulatedFeedClient::new(simulation_settings(&config));
    let manager = Arc::new(SubscriptionManager::with_metrics(
        Arc::new(client),
        resolver,
        metrics.clone(),
    ));
    manager.add_listener(Arc::new(LoggingListener));

    let shutdown = ShutdownController::with_ctrl_c();
    // The feed outlives the other tasks so the final cancels reach it
    let feed_token = CancellationToken::new();
    let feed_listener: Arc<dyn FeedListener> = manager.clone();
    let feed_task = tokio::spawn(feed.run(feed_listener, feed_token.clone()));

    let (changes, controller_task) = ResubscriptionController::new(manager.clone())
        .spawn(live_data.resubscribe_channel_capacity, shutdown.child_token());

    let simulation = config.simulation_or_default();
    let refresh_task = (simulation.rules_refresh_secs > 0).then(|| {
        tokio::spawn(rules_refresh(
            changes.clone(),
            simulation.rules_refresh_schemes.clone(),
            Duration::from_secs(simulation.rules_refresh_secs),
            shutdown.child_token(),
        ))
    });

    let outcome = manager.subscribe(keys.iter().cloned());
    for (key, error) in &outcome.unavailable {
        warn!(key = %key, %error, "Startup subscription not available");
    }
    info!(
        keys = keys.len(),
        requested = outcome.requested.len(),
        "Startup subscriptions issued"
    );

    let snapshot_task = tokio::spawn(snapshot_loop(
        manager.clone(),
        keys.into_iter().collect(),
        Duration::from_millis(live_data.snapshot_interval_ms),
        Duration::from_millis(live_data.snapshot_timeout_ms),
        metrics,
        shutdown.child_token(),
    ));

    info!(service = %config.service.name, "Live data service running, press Ctrl+C to stop");
    shutdown.wait_for_shutdown().await;

    drop(changes);
    if let Some(task) = refresh_task {
        task.await.context("Rules refresh task panicked")?;
    }
    controller_task.await.context("Resubscription controller panicked")?;
    snapshot_task.await.context("Snapshot task panicked")?;

    manager.unsubscribe_all();
    info!(
        requested = manager.requested_subscription_count(),
        "Subscriptions released"
    );

    feed_token.cancel();
    feed_task.await.context("Feed task panicked")?;

    info!("Live data service stopped");
    Ok(())
}

async fn rules_refresh(
    changes: mpsc::Sender<SchemeChange>,
    schemes: Vec<String>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let change = SchemeChange::new(schemes.iter().cloned(), "scheduled rules refresh");
                if changes.send(change).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn snapshot_loop(
    manager: Arc<SubscriptionManager>,
    required: HashSet<ValueKey>,
    period: Duration,
    timeout: Duration,
    metrics: LiveDataMetrics,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let manager = manager.clone();
                let required = required.clone();
                let metrics = metrics.clone();

                // init blocks, keep it off the runtime threads
                let taken = tokio::task::spawn_blocking(move || {
                    let mut snapshot = manager.snapshot(Some(&required));
                    let missing = {
                        let _timer = SnapshotInitTimer::new(&metrics);
                        snapshot.init(&required, timeout)
                    };
                    (snapshot, missing)
                })
                .await;

                match taken {
                    Ok((snapshot, missing)) => {
                        info!(
                            values = snapshot.len(),
                            missing = missing.len(),
                            at = %snapshot.snapshot_time(),
                            "Snapshot taken"
                        );
                        for key in snapshot.keys() {
                            if let Some(value) = snapshot.query(key) {
                                debug!(key = %key, value = value.value, "Snapshot value");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Snapshot task failed"),
                }
            }
        }
    }
}
