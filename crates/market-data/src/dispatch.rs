//! Ordered delivery of outbound effects
//!
//! The subscription manager records feed requests and listener notifications
//! while it holds its state lock and hands them here before releasing it.
//! Delivery happens after the lock is gone, in the order the effects were
//! queued, by whichever thread wins the drain.

use crate::feed::FeedClient;
use crate::listener::MarketDataListener;
use crate::types::{FeedSpec, FullyQualifiedSpec};
use common::ValueKey;
use observability::LiveDataMetrics;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outbound {
    Subscribe(Vec<FeedSpec>),
    Resubscribe(Vec<FeedSpec>),
    Cancel(Vec<FullyQualifiedSpec>),
    Succeeded(Vec<ValueKey>),
    Failed(Vec<ValueKey>, String),
    Stopped(Vec<ValueKey>),
    ValuesChanged(Vec<ValueKey>),
}

pub(crate) struct Dispatcher {
    feed: Arc<dyn FeedClient>,
    listeners: RwLock<Vec<Arc<dyn MarketDataListener>>>,
    queue: Mutex<VecDeque<Outbound>>,
    draining: Mutex<()>,
    metrics: LiveDataMetrics,
}

impl Dispatcher {
    pub fn new(feed: Arc<dyn FeedClient>, metrics: LiveDataMetrics) -> Self {
        Self {
            feed,
            listeners: RwLock::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            draining: Mutex::new(()),
            metrics,
        }
    }

    pub fn metrics(&self) -> &LiveDataMetrics {
        &self.metrics
    }

    pub fn add_listener(&self, listener: Arc<dyn MarketDataListener>) {
        self.listeners.write().push(listener);
    }

    /// Queue effects; call while still holding the state lock that produced them
    pub fn enqueue(&self, items: Vec<Outbound>) {
        if !items.is_empty() {
            self.queue.lock().extend(items);
        }
    }

    /// Deliver queued effects. Returns immediately if another thread (or an
    /// outer frame of this one) is already draining; that drainer picks up
    /// whatever was queued.
    pub fn drain(&self) {
        loop {
            let Some(guard) = self.draining.try_lock() else {
                return;
            };
            loop {
                let next = self.queue.lock().pop_front();
                let Some(item) = next else {
                    break;
                };
                self.deliver(item);
            }
            drop(guard);

            // an enqueue may have raced the release
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, item: Outbound) {
        match item {
            Outbound::Subscribe(specs) => {
                debug!(count = specs.len(), "Sending subscription requests");
                self.metrics.subscribe_requested(specs.len());
                self.feed.subscribe(&specs);
            }
            Outbound::Resubscribe(specs) => {
                debug!(count = specs.len(), "Sending resubscription requests");
                self.metrics.resubscribe_requested(specs.len());
                self.feed.resubscribe(&specs);
            }
            Outbound::Cancel(specs) => {
                debug!(count = specs.len(), "Cancelling feed subscriptions");
                self.metrics.cancel_requested(specs.len());
                self.feed.unsubscribe(&specs);
            }
            Outbound::Succeeded(keys) => self.notify(|l| l.subscriptions_succeeded(&keys)),
            Outbound::Failed(keys, reason) => self.notify(|l| l.subscription_failed(&keys, &reason)),
            Outbound::Stopped(keys) => self.notify(|l| l.subscriptions_stopped(&keys)),
            Outbound::ValuesChanged(keys) => self.notify(|l| l.values_changed(&keys)),
        }
    }

    fn notify(&self, f: impl Fn(&dyn MarketDataListener)) {
        // copy out so listeners may register further listeners
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::RecordingFeedClient;
    use common::ExternalId;

    fn spec(ticker: &str) -> FeedSpec {
        FeedSpec::new("OpenGamma", ExternalId::of("Foo", ticker))
    }

    #[test]
    fn test_drain_preserves_order() {
        let feed = Arc::new(RecordingFeedClient::new());
        let dispatcher = Dispatcher::new(feed.clone(), LiveDataMetrics::new());

        dispatcher.enqueue(vec![
            Outbound::Subscribe(vec![spec("a")]),
            Outbound::Cancel(vec![spec("a").as_fully_qualified()]),
            Outbound::Subscribe(vec![spec("b"), spec("c")]),
        ]);
        dispatcher.drain();

        assert_eq!(
            feed.subscription_requests(),
            vec![vec![spec("a")], vec![spec("b"), spec("c")]]
        );
        assert_eq!(feed.cancel_requests(), vec![spec("a").as_fully_qualified()]);
        assert!(dispatcher.queue.lock().is_empty());
    }

    #[test]
    fn test_nested_drain_defers_to_outer() {
        let feed = Arc::new(RecordingFeedClient::new());
        let dispatcher = Dispatcher::new(feed.clone(), LiveDataMetrics::new());

        let guard = dispatcher.draining.lock();
        dispatcher.enqueue(vec![Outbound::Subscribe(vec![spec("a")])]);
        dispatcher.drain();
        assert_eq!(feed.subscription_request_count(), 0);
        drop(guard);

        dispatcher.drain();
        assert_eq!(feed.subscription_request_count(), 1);
    }
}
