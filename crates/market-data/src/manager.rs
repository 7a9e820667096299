//! Live data subscription manager
//!
//! Deduplicates subscriptions per [`FeedSpec`], reference-counts the keys
//! that depend on each one, reconciles asynchronous feed responses and fans
//! ticks out to the last-known-value store.
//!
//! All subscription state lives behind one mutex. Feed requests and listener
//! notifications produced by a transition are queued before that mutex is
//! released and delivered after it, so callbacks may re-enter the manager.

use crate::dispatch::{Dispatcher, Outbound};
use crate::error::MarketDataError;
use crate::feed::{FeedClient, FeedListener, SubscriptionOutcome, SubscriptionResponse};
use crate::listener::MarketDataListener;
use crate::lkv::LastKnownValueStore;
use crate::resolver::AvailabilityResolver;
use crate::snapshot::LiveDataSnapshot;
use crate::subscription::Subscription;
use crate::types::{FeedSpec, FieldMessage, FullyQualifiedSpec, MarketValue, SubscriptionInfo};
use chrono::Utc;
use common::{ExternalScheme, ValueKey};
use observability::LiveDataMetrics;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a [`SubscriptionManager::subscribe`] call
#[derive(Debug, Default)]
pub struct SubscribeOutcome {
    /// Feed specs sent to the feed by this call
    pub requested: Vec<FeedSpec>,
    /// Keys that could not be resolved to a feed line
    pub unavailable: Vec<(ValueKey, MarketDataError)>,
}

#[derive(Default)]
struct ManagerState {
    subscriptions: HashMap<FeedSpec, Subscription>,
    key_specs: HashMap<ValueKey, FeedSpec>,
    /// Active subscriptions grouped by the stream that feeds them
    fan_out: HashMap<FullyQualifiedSpec, HashSet<FeedSpec>>,
    /// Subscriptions holding demand
    requested: usize,
    /// Subscriber references across active subscriptions
    active_values: usize,
}

impl ManagerState {
    /// Take a subscription out of the table, along with its share of the
    /// counters. Hand it back with [`put`](Self::put) unless it is discarded.
    fn take(&mut self, spec: &FeedSpec) -> Option<Subscription> {
        let subscription = self.subscriptions.remove(spec)?;
        let (requested, active_values) = contribution(&subscription);
        self.requested -= requested;
        self.active_values -= active_values;
        Some(subscription)
    }

    fn put(&mut self, subscription: Subscription) {
        let (requested, active_values) = contribution(&subscription);
        self.requested += requested;
        self.active_values += active_values;
        self.subscriptions
            .insert(subscription.feed_spec().clone(), subscription);
    }

    fn join_group(&mut self, fully_qualified: FullyQualifiedSpec, spec: FeedSpec) {
        self.fan_out.entry(fully_qualified).or_default().insert(spec);
    }

    /// Remove `spec` from the group for `fully_qualified`. Returns true if
    /// the group is now empty and its stream should be cancelled.
    fn leave_group(&mut self, fully_qualified: &FullyQualifiedSpec, spec: &FeedSpec) -> bool {
        let Some(group) = self.fan_out.get_mut(fully_qualified) else {
            return false;
        };
        group.remove(spec);
        if group.is_empty() {
            self.fan_out.remove(fully_qualified);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn recount(&self) -> (usize, usize) {
        self.subscriptions
            .values()
            .map(contribution)
            .fold((0, 0), |(r, a), (dr, da)| (r + dr, a + da))
    }
}

/// What a subscription adds to the requested and active-value counters
fn contribution(subscription: &Subscription) -> (usize, usize) {
    let requested = usize::from(!subscription.is_orphaned());
    let active_values = if subscription.is_active() {
        subscription.subscriber_count()
    } else {
        0
    };
    (requested, active_values)
}

/// Maintains live subscriptions on behalf of the calculation engine
///
/// # Example
///
/// ```ignore
/// let manager = Arc::new(SubscriptionManager::new(feed, resolver));
/// let outcome = manager.subscribe(keys);
/// // ... the feed answers through the FeedListener impl ...
/// let mut snapshot = manager.snapshot(None);
/// snapshot.init(&required, Duration::from_secs(1));
/// ```
pub struct SubscriptionManager {
    resolver: Arc<dyn AvailabilityResolver>,
    state: Mutex<ManagerState>,
    lkv: Arc<LastKnownValueStore>,
    dispatcher: Dispatcher,
}

impl SubscriptionManager {
    pub fn new(feed: Arc<dyn FeedClient>, resolver: Arc<dyn AvailabilityResolver>) -> Self {
        Self::with_metrics(feed, resolver, LiveDataMetrics::new())
    }

    pub fn with_metrics(
        feed: Arc<dyn FeedClient>,
        resolver: Arc<dyn AvailabilityResolver>,
        metrics: LiveDataMetrics,
    ) -> Self {
        Self {
            resolver,
            state: Mutex::new(ManagerState::default()),
            lkv: Arc::new(LastKnownValueStore::new()),
            dispatcher: Dispatcher::new(feed, metrics),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MarketDataListener>) {
        self.dispatcher.add_listener(listener);
    }

    /// Run a transition under the state lock, queue its effects, then deliver them
    fn transition<R>(&self, f: impl FnOnce(&mut ManagerState, &mut Vec<Outbound>) -> R) -> R {
        self.locked(true, f)
    }

    fn locked<R>(
        &self,
        refresh_gauges: bool,
        f: impl FnOnce(&mut ManagerState, &mut Vec<Outbound>) -> R,
    ) -> R {
        let result = {
            let mut state = self.state.lock();
            let mut outbox = Vec::new();
            let result = f(&mut state, &mut outbox);
            if refresh_gauges {
                self.dispatcher
                    .metrics()
                    .set_subscription_counts(state.requested, state.active_values);
            }
            self.dispatcher.enqueue(outbox);
            result
        };
        self.dispatcher.drain();
        result
    }

    /// Add one reference per key. Keys that cannot be resolved are reported
    /// in the outcome; the rest proceed. Only feed specs with no live
    /// subscription are sent to the feed, in one batch.
    pub fn subscribe<I>(&self, keys: I) -> SubscribeOutcome
    where
        I: IntoIterator<Item = ValueKey>,
    {
        let resolved: Vec<(ValueKey, crate::Result<FeedSpec>)> = keys
            .into_iter()
            .map(|key| {
                let spec = self.resolver.resolve(&key);
                (key, spec)
            })
            .collect();

        self.transition(|state, outbox| {
            let mut outcome = SubscribeOutcome::default();
            let mut succeeded = Vec::new();
            let mut failed: HashMap<String, Vec<ValueKey>> = HashMap::new();

            for (key, resolution) in resolved {
                let spec = match (state.key_specs.get(&key), resolution) {
                    (Some(existing), _) => existing.clone(),
                    (None, Ok(spec)) => spec,
                    (None, Err(e)) => {
                        debug!(key = %key, error = %e, "Key not available");
                        outcome.unavailable.push((key, e));
                        continue;
                    }
                };

                state.key_specs.insert(key.clone(), spec.clone());
                match state.take(&spec) {
                    Some(mut subscription) => {
                        subscription.add_subscriber(key.clone());
                        if subscription.is_active() {
                            succeeded.push(key);
                        } else if let Some(reason) = subscription.last_failure() {
                            failed.entry(reason.to_string()).or_default().push(key);
                        }
                        state.put(subscription);
                    }
                    None => {
                        let mut subscription = Subscription::new(spec.clone());
                        subscription.add_subscriber(key);
                        state.put(subscription);
                        outcome.requested.push(spec);
                    }
                }
            }

            if !outcome.requested.is_empty() {
                info!(count = outcome.requested.len(), "Requesting new subscriptions");
                outbox.push(Outbound::Subscribe(outcome.requested.clone()));
            }
            if !succeeded.is_empty() {
                outbox.push(Outbound::Succeeded(succeeded));
            }
            for (reason, keys) in failed {
                outbox.push(Outbound::Failed(keys, reason));
            }
            outcome
        })
    }

    /// Release one reference per key. Unknown keys are ignored.
    pub fn unsubscribe<I>(&self, keys: I)
    where
        I: IntoIterator<Item = ValueKey>,
    {
        self.transition(|state, outbox| {
            let mut stopped = Vec::new();
            let mut cancels = Vec::new();

            for key in keys {
                let Some(spec) = state.key_specs.get(&key).cloned() else {
                    debug!(key = %key, "Unsubscribe for unknown key");
                    continue;
                };
                let Some(mut subscription) = state.take(&spec) else {
                    state.key_specs.remove(&key);
                    continue;
                };

                if subscription.remove_subscriber(&key) == Some(true) {
                    state.key_specs.remove(&key);
                    self.lkv.remove(&key);
                    stopped.push(key);
                }
                if !subscription.is_orphaned() {
                    state.put(subscription);
                    continue;
                }

                if subscription.is_active() {
                    if let Some(fq) = subscription.cancel() {
                        if state.leave_group(&fq, &spec) {
                            info!(spec = %fq, "Cancelling subscription");
                            cancels.push(fq);
                        }
                    }
                } else if subscription.awaiting_response() {
                    debug!(spec = %spec, "Subscription will be cancelled on arrival");
                    state.put(subscription);
                } else {
                    debug!(spec = %spec, "Discarding failed subscription");
                }
            }

            if !cancels.is_empty() {
                outbox.push(Outbound::Cancel(cancels));
            }
            if !stopped.is_empty() {
                outbox.push(Outbound::Stopped(stopped));
            }
        })
    }

    /// Release every reference held on every subscription
    pub fn unsubscribe_all(&self) {
        let keys: Vec<ValueKey> = {
            let state = self.state.lock();
            state
                .subscriptions
                .values()
                .flat_map(|s| s.references())
                .flat_map(|(key, refs)| std::iter::repeat(key.clone()).take(refs))
                .collect()
        };
        self.unsubscribe(keys);
    }

    /// Re-request every active subscription with an identifier in one of
    /// `schemes`. Returns the number of feed specs re-requested.
    pub fn resubscribe(&self, schemes: &HashSet<ExternalScheme>) -> usize {
        self.transition(|state, outbox| {
            let specs: Vec<FeedSpec> = state
                .subscriptions
                .values()
                .filter(|s| s.is_active() && s.feed_spec().spec().matches_any_scheme(schemes))
                .map(|s| s.feed_spec().clone())
                .collect();

            let count = specs.len();
            if count > 0 {
                info!(count, "Resubscribing after scheme change");
                outbox.push(Outbound::Resubscribe(specs));
            }
            count
        })
    }

    fn apply_response(&self, state: &mut ManagerState, outbox: &mut Vec<Outbound>, response: SubscriptionResponse) {
        let spec = response.requested;
        let Some(mut subscription) = state.take(&spec) else {
            debug!(spec = %spec, "Response for unknown subscription");
            return;
        };

        match response.outcome {
            SubscriptionOutcome::Success { fully_qualified } => {
                if subscription.is_orphaned() {
                    if state.fan_out.contains_key(&fully_qualified) {
                        debug!(spec = %fully_qualified, "Stream still in use, dropping orphaned subscription");
                    } else {
                        info!(spec = %fully_qualified, "Cancelling subscription on arrival");
                        outbox.push(Outbound::Cancel(vec![fully_qualified]));
                    }
                    return;
                }

                if subscription.fully_qualified() == Some(&fully_qualified) {
                    debug!(spec = %spec, "Duplicate subscription response");
                    subscription.clear_failure();
                } else if subscription.is_active() {
                    let previous = subscription.activate(fully_qualified.clone());
                    state.join_group(fully_qualified.clone(), spec.clone());
                    if let Some(previous) = previous {
                        info!(from = %previous, to = %fully_qualified, "Subscription moved stream");
                        if state.leave_group(&previous, &spec) {
                            outbox.push(Outbound::Cancel(vec![previous]));
                        }
                    }
                } else {
                    subscription.activate(fully_qualified.clone());
                    let keys: Vec<ValueKey> = subscription.keys().cloned().collect();
                    info!(spec = %spec, stream = %fully_qualified, subscribers = keys.len(), "Subscription active");
                    state.join_group(fully_qualified, spec);
                    outbox.push(Outbound::Succeeded(keys));
                }
                state.put(subscription);
            }
            SubscriptionOutcome::Failure { reason } => {
                self.dispatcher.metrics().subscription_failed();
                if subscription.is_orphaned() {
                    debug!(spec = %spec, reason = %reason, "Orphaned subscription failed");
                    return;
                }

                if subscription.is_active() {
                    warn!(spec = %spec, reason = %reason, "Failure reported for active subscription");
                    subscription.record_failure(reason);
                } else {
                    warn!(spec = %spec, reason = %reason, "Subscription failed");
                    let keys: Vec<ValueKey> = subscription.keys().cloned().collect();
                    subscription.record_failure(reason.clone());
                    outbox.push(Outbound::Failed(keys, reason));
                }
                state.put(subscription);
            }
        }
    }

    /// Subscriptions that hold demand: pending, failed or active
    pub fn requested_subscription_count(&self) -> usize {
        self.state.lock().requested
    }

    /// Total subscriber references across active subscriptions
    pub fn active_value_specification_subscription_count(&self) -> usize {
        self.state.lock().active_values
    }

    /// Status of the subscription backing `key`, if the key holds demand
    pub fn status(&self, key: &ValueKey) -> Option<SubscriptionInfo> {
        let state = self.state.lock();
        let spec = state.key_specs.get(key)?;
        state.subscriptions.get(spec).map(Subscription::info)
    }

    /// Subscriptions whose identifiers carry `ticker` as a value, in any scheme
    pub fn query_by_ticker(&self, ticker: &str) -> HashMap<FeedSpec, SubscriptionInfo> {
        self.state
            .lock()
            .subscriptions
            .iter()
            .filter(|(spec, _)| spec.identifiers().iter().any(|id| id.value() == ticker))
            .map(|(spec, subscription)| (spec.clone(), subscription.info()))
            .collect()
    }

    /// Diagnostic view of every tracked subscription
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.state.lock().subscriptions.values().map(Subscription::info).collect()
    }

    pub fn query(&self, key: &ValueKey) -> Option<MarketValue> {
        self.lkv.get(key)
    }

    pub fn snapshot(&self, filter: Option<&HashSet<ValueKey>>) -> LiveDataSnapshot {
        self.lkv.snapshot(filter)
    }

    pub fn lkv(&self) -> Arc<LastKnownValueStore> {
        Arc::clone(&self.lkv)
    }
}

impl FeedListener for SubscriptionManager {
    fn subscription_result_received(&self, response: SubscriptionResponse) {
        self.transition(|state, outbox| self.apply_response(state, outbox, response));
    }

    fn subscription_results_received(&self, responses: Vec<SubscriptionResponse>) {
        self.transition(|state, outbox| {
            for response in responses {
                self.apply_response(state, outbox, response);
            }
        });
    }

    fn market_data_received(&self, fully_qualified: &FullyQualifiedSpec, message: &FieldMessage) {
        // ticks never change subscription counts
        self.locked(false, |state, outbox| {
            let Some(group) = state.fan_out.get(fully_qualified) else {
                debug!(spec = %fully_qualified, "Dropping tick for unknown stream");
                self.dispatcher.metrics().tick_unrouted();
                return;
            };

            let received_at = Utc::now();
            let updates: Vec<(ValueKey, MarketValue)> = group
                .iter()
                .filter_map(|spec| state.subscriptions.get(spec))
                .flat_map(|subscription| subscription.keys())
                .filter_map(|key| {
                    message
                        .get(key.value_name())
                        .map(|value| (key.clone(), MarketValue { value, received_at }))
                })
                .collect();

            self.dispatcher.metrics().tick_routed();
            if updates.is_empty() {
                return;
            }
            let changed: Vec<ValueKey> = updates.iter().map(|(key, _)| key.clone()).collect();
            self.lkv.put_all(updates);
            outbox.push(Outbound::ValuesChanged(changed));
        });
    }
}
