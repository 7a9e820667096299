//! In-process simulated feed
//!
//! Answers subscription requests after a configurable delay and publishes a
//! seeded random walk for every open stream. Used by the `lkv` binary and by
//! tests that need a feed running on another task.

use super::{FeedClient, FeedListener, SubscriptionResponse};
use crate::types::{FeedSpec, FieldMessage, FullyQualifiedSpec};
use common::value_names;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Behaviour of the simulated feed
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Interval between ticks on every open stream
    pub tick_interval: Duration,
    /// Delay before subscription responses are delivered
    pub response_delay: Duration,
    /// Identifier values the feed refuses to subscribe
    pub failing_tickers: HashSet<String>,
    pub seed: u64,
    pub initial_price: f64,
    /// Maximum relative move per tick
    pub volatility: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            response_delay: Duration::from_millis(50),
            failing_tickers: HashSet::new(),
            seed: 42,
            initial_price: 100.0,
            volatility: 0.002,
        }
    }
}

#[derive(Debug)]
enum FeedCommand {
    Subscribe(Vec<FeedSpec>),
    Unsubscribe(Vec<FullyQualifiedSpec>),
}

/// Request side of the simulated feed
///
/// Requests are queued to the [`SimulatedFeed`] task and never block.
#[derive(Debug, Clone)]
pub struct SimulatedFeedClient {
    commands: mpsc::UnboundedSender<FeedCommand>,
}

impl SimulatedFeedClient {
    /// Create a client and the feed task that serves it
    pub fn new(settings: SimulationSettings) -> (Self, SimulatedFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = SimulatedFeed {
            rng: ChaCha8Rng::seed_from_u64(settings.seed),
            settings,
            commands: rx,
            prices: HashMap::new(),
        };
        (Self { commands: tx }, feed)
    }

    fn send(&self, command: FeedCommand) {
        if self.commands.send(command).is_err() {
            warn!("Simulated feed stopped, dropping request");
        }
    }
}

impl FeedClient for SimulatedFeedClient {
    fn subscribe(&self, specs: &[FeedSpec]) {
        self.send(FeedCommand::Subscribe(specs.to_vec()));
    }

    fn unsubscribe(&self, specs: &[FullyQualifiedSpec]) {
        self.send(FeedCommand::Unsubscribe(specs.to_vec()));
    }
}

/// The feed task; consume it with [`SimulatedFeed::run`]
pub struct SimulatedFeed {
    settings: SimulationSettings,
    commands: mpsc::UnboundedReceiver<FeedCommand>,
    rng: ChaCha8Rng,
    prices: HashMap<FullyQualifiedSpec, f64>,
}

impl SimulatedFeed {
    /// Serve requests and publish ticks until `shutdown` is cancelled or
    /// every client has been dropped
    pub async fn run(mut self, listener: Arc<dyn FeedListener>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_interval_ms = self.settings.tick_interval.as_millis() as u64,
            seed = self.settings.seed,
            "Simulated feed started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(FeedCommand::Subscribe(specs)) => {
                        if !self.settings.response_delay.is_zero() {
                            tokio::time::sleep(self.settings.response_delay).await;
                        }
                        let responses = self.respond(specs);
                        listener.subscription_results_received(responses);
                    }
                    Some(FeedCommand::Unsubscribe(specs)) => {
                        for spec in &specs {
                            if self.prices.remove(spec).is_some() {
                                debug!(spec = %spec, "Simulated stream closed");
                            }
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.publish(listener.as_ref()),
            }
        }

        info!(open_streams = self.prices.len(), "Simulated feed stopped");
    }

    fn respond(&mut self, specs: Vec<FeedSpec>) -> Vec<SubscriptionResponse> {
        specs
            .into_iter()
            .map(|spec| {
                let Some(id) = spec.identifiers().first().cloned() else {
                    return SubscriptionResponse::failure(spec, "empty identifier bundle");
                };
                if spec
                    .identifiers()
                    .iter()
                    .any(|id| self.settings.failing_tickers.contains(id.value()))
                {
                    return SubscriptionResponse::failure(spec, format!("unknown ticker {}", id));
                }

                let fully_qualified = FullyQualifiedSpec::new(spec.normalization(), id);
                if !self.prices.contains_key(&fully_qualified) {
                    let start = self.settings.initial_price * self.rng.gen_range(0.5..1.5);
                    self.prices.insert(fully_qualified.clone(), start);
                }
                SubscriptionResponse::success(spec, fully_qualified)
            })
            .collect()
    }

    fn publish(&mut self, listener: &dyn FeedListener) {
        let volatility = self.settings.volatility;
        for (spec, price) in self.prices.iter_mut() {
            if volatility > 0.0 {
                *price *= 1.0 + self.rng.gen_range(-volatility..=volatility);
            }
            let half_spread = *price * 0.0005;
            let message = FieldMessage::new()
                .with(value_names::MARKET_VALUE, *price)
                .with(value_names::LAST, *price)
                .with(value_names::BID, *price - half_spread)
                .with(value_names::ASK, *price + half_spread);
            listener.market_data_received(spec, &message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SubscriptionOutcome;
    use common::ExternalId;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingListener {
        responses: Mutex<Vec<SubscriptionResponse>>,
        ticks: Mutex<Vec<(FullyQualifiedSpec, FieldMessage)>>,
    }

    impl FeedListener for CollectingListener {
        fn subscription_result_received(&self, response: SubscriptionResponse) {
            self.responses.lock().push(response);
        }

        fn market_data_received(&self, fully_qualified: &FullyQualifiedSpec, message: &FieldMessage) {
            self.ticks.lock().push((fully_qualified.clone(), message.clone()));
        }
    }

    fn settings() -> SimulationSettings {
        SimulationSettings {
            tick_interval: Duration::from_millis(5),
            response_delay: Duration::ZERO,
            failing_tickers: ["BAD".to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_responds_and_ticks() {
        let (client, feed) = SimulatedFeedClient::new(settings());
        let listener = Arc::new(CollectingListener::default());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(feed.run(listener.clone(), shutdown.clone()));

        let good = FeedSpec::new("OpenGamma", ExternalId::of("Foo", "GOOD"));
        let bad = FeedSpec::new("OpenGamma", ExternalId::of("Foo", "BAD"));
        client.subscribe(&[good.clone(), bad.clone()]);

        wait_until(|| listener.responses.lock().len() == 2).await;
        wait_until(|| !listener.ticks.lock().is_empty()).await;

        {
            let responses = listener.responses.lock();
            assert_eq!(responses[0].requested, good);
            assert_eq!(
                responses[0].outcome,
                SubscriptionOutcome::Success {
                    fully_qualified: good.as_fully_qualified()
                }
            );
            assert!(!responses[1].is_success());
        }

        let ticks = listener.ticks.lock().clone();
        assert!(ticks.iter().all(|(fq, _)| *fq == good.as_fully_qualified()));
        let (_, message) = &ticks[0];
        assert!(message.get(value_names::BID) < message.get(value_names::ASK));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_ticks() {
        let (client, feed) = SimulatedFeedClient::new(settings());
        let listener = Arc::new(CollectingListener::default());
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(feed.run(listener.clone(), shutdown.clone()));

        let spec = FeedSpec::new("OpenGamma", ExternalId::of("Foo", "GOOD"));
        client.subscribe(&[spec.clone()]);
        wait_until(|| !listener.ticks.lock().is_empty()).await;

        client.unsubscribe(&[spec.as_fully_qualified()]);
        // let the feed drain the command, then check nothing more arrives
        tokio::time::sleep(Duration::from_millis(30)).await;
        let seen = listener.ticks.lock().len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(listener.ticks.lock().len(), seen);

        drop(client);
        task.await.unwrap();
        assert!(!shutdown.is_cancelled());
    }
}
