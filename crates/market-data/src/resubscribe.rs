//! Bulk resubscription on normalization rule changes
//!
//! When the rules for a set of identifier schemes change, active
//! subscriptions in those schemes are re-requested so the feed applies the
//! new rules. Notifications arrive on a bounded channel.

use crate::manager::SubscriptionManager;
use common::ExternalScheme;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Notification that the rules for `schemes` changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeChange {
    pub schemes: HashSet<ExternalScheme>,
    pub reason: String,
}

impl SchemeChange {
    pub fn new<I, S>(schemes: I, reason: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ExternalScheme>,
    {
        Self {
            schemes: schemes.into_iter().map(Into::into).collect(),
            reason: reason.into(),
        }
    }
}

/// Re-issues subscribe requests for active subscriptions of changed schemes
#[derive(Clone)]
pub struct ResubscriptionController {
    manager: Arc<SubscriptionManager>,
}

impl ResubscriptionController {
    pub fn new(manager: Arc<SubscriptionManager>) -> Self {
        Self { manager }
    }

    /// Handle one notification synchronously; returns the number of feed
    /// specs re-requested
    pub fn on_schemes_changed(&self, change: &SchemeChange) -> usize {
        let count = self.manager.resubscribe(&change.schemes);
        info!(
            schemes = change.schemes.len(),
            resubscribed = count,
            reason = %change.reason,
            "Scheme change handled"
        );
        count
    }

    /// Consume notifications until the channel closes or `shutdown` fires
    pub async fn run(self, mut changes: mpsc::Receiver<SchemeChange>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Resubscription controller shutting down");
                    break;
                }
                change = changes.recv() => match change {
                    Some(change) => {
                        self.on_schemes_changed(&change);
                    }
                    None => break,
                },
            }
        }
    }

    /// Spawn the controller on the current runtime
    pub fn spawn(
        self,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (mpsc::Sender<SchemeChange>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(self.run(rx, shutdown));
        (tx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedListener, RecordingFeedClient, SubscriptionResponse};
    use crate::resolver::PropertyResolver;
    use crate::types::FeedSpec;
    use common::{property_names, value_names, ExternalId, TargetSpec, ValueKey};
    use std::time::Duration;

    fn key(scheme: &str, ticker: &str) -> ValueKey {
        let id = ExternalId::of(scheme, ticker);
        ValueKey::new(value_names::MARKET_VALUE, TargetSpec::primitive(&id))
            .with_property(property_names::ID, id.to_string())
    }

    fn active_manager() -> (Arc<RecordingFeedClient>, Arc<SubscriptionManager>) {
        let feed = Arc::new(RecordingFeedClient::new());
        let manager = Arc::new(SubscriptionManager::new(
            feed.clone(),
            Arc::new(PropertyResolver::new("OpenGamma")),
        ));
        manager.subscribe(vec![key("RIC", "AAPL.O"), key("TICKER", "AAPL")]);
        for ticker in [("RIC", "AAPL.O"), ("TICKER", "AAPL")] {
            let spec = FeedSpec::new("OpenGamma", ExternalId::of(ticker.0, ticker.1));
            let fq = spec.as_fully_qualified();
            manager.subscription_result_received(SubscriptionResponse::success(spec, fq));
        }
        feed.clear();
        (feed, manager)
    }

    #[test]
    fn test_on_schemes_changed() {
        let (feed, manager) = active_manager();
        let controller = ResubscriptionController::new(manager);

        let count = controller.on_schemes_changed(&SchemeChange::new(["RIC"], "rules reloaded"));
        assert_eq!(count, 1);
        assert_eq!(
            feed.subscription_requests(),
            vec![vec![FeedSpec::new("OpenGamma", ExternalId::of("RIC", "AAPL.O"))]]
        );
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let (feed, manager) = active_manager();
        let shutdown = CancellationToken::new();
        let (tx, handle) = ResubscriptionController::new(manager).spawn(4, shutdown.clone());

        tx.send(SchemeChange::new(["RIC", "TICKER"], "rules reloaded"))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while feed.subscription_request_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("resubscription not issued");
        assert_eq!(feed.subscription_requests()[0].len(), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_senders_dropped() {
        let (_, manager) = active_manager();
        let (tx, handle) = ResubscriptionController::new(manager).spawn(1, CancellationToken::new());
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("controller did not stop")
            .unwrap();
    }
}
