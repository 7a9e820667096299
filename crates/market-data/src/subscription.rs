//! One live feed line and the keys that depend on it

use crate::types::{FeedSpec, FullyQualifiedSpec, SubscriptionInfo, SubscriptionState, SubscriptionStatus};
use chrono::{DateTime, Utc};
use common::ValueKey;
use std::collections::HashMap;

/// A deduplicated subscription, keyed by its [`FeedSpec`]
///
/// Subscribers form a multiset: every subscribe call adds one reference and
/// every unsubscribe removes one. `fully_qualified` is set iff the state is
/// `Active`.
#[derive(Debug, Clone)]
pub struct Subscription {
    feed_spec: FeedSpec,
    fully_qualified: Option<FullyQualifiedSpec>,
    state: SubscriptionState,
    subscribers: HashMap<ValueKey, usize>,
    subscriber_count: usize,
    last_failure: Option<String>,
    created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(feed_spec: FeedSpec) -> Self {
        Self {
            feed_spec,
            fully_qualified: None,
            state: SubscriptionState::Pending,
            subscribers: HashMap::new(),
            subscriber_count: 0,
            last_failure: None,
            created_at: Utc::now(),
        }
    }

    pub fn feed_spec(&self) -> &FeedSpec {
        &self.feed_spec
    }

    pub fn fully_qualified(&self) -> Option<&FullyQualifiedSpec> {
        self.fully_qualified.as_ref()
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count
    }

    /// Add one reference for `key`. Returns true if the key was not a
    /// subscriber before.
    pub fn add_subscriber(&mut self, key: ValueKey) -> bool {
        self.subscriber_count += 1;
        let refs = self.subscribers.entry(key).or_insert(0);
        *refs += 1;
        *refs == 1
    }

    /// Drop one reference for `key`. Returns `None` if the key does not
    /// subscribe, otherwise whether that was its last reference.
    pub fn remove_subscriber(&mut self, key: &ValueKey) -> Option<bool> {
        let refs = self.subscribers.get_mut(key)?;
        *refs -= 1;
        self.subscriber_count -= 1;
        if *refs == 0 {
            self.subscribers.remove(key);
            Some(true)
        } else {
            Some(false)
        }
    }

    pub fn is_subscriber(&self, key: &ValueKey) -> bool {
        self.subscribers.contains_key(key)
    }

    /// No subscriber holds demand any more
    pub fn is_orphaned(&self) -> bool {
        self.subscriber_count == 0
    }

    /// Distinct subscribing keys
    pub fn keys(&self) -> impl Iterator<Item = &ValueKey> {
        self.subscribers.keys()
    }

    /// Subscribing keys with their reference counts
    pub fn references(&self) -> impl Iterator<Item = (&ValueKey, usize)> {
        self.subscribers.iter().map(|(key, refs)| (key, *refs))
    }

    /// Move to `Active` on `fully_qualified`, returning the previous
    /// fully-qualified spec if it differed
    pub fn activate(&mut self, fully_qualified: FullyQualifiedSpec) -> Option<FullyQualifiedSpec> {
        self.state = SubscriptionState::Active;
        self.last_failure = None;
        match self.fully_qualified.replace(fully_qualified) {
            Some(previous) if Some(&previous) != self.fully_qualified.as_ref() => Some(previous),
            _ => None,
        }
    }

    pub fn record_failure(&mut self, reason: impl Into<String>) {
        self.last_failure = Some(reason.into());
    }

    /// Forget a failure once the feed confirms the stream again
    pub fn clear_failure(&mut self) {
        self.last_failure = None;
    }

    /// Terminal transition; returns the stream to cancel, if any
    pub fn cancel(&mut self) -> Option<FullyQualifiedSpec> {
        self.state = SubscriptionState::Cancelled;
        self.subscribers.clear();
        self.subscriber_count = 0;
        self.fully_qualified.take()
    }

    /// Pending and not yet answered with a failure
    pub fn awaiting_response(&self) -> bool {
        self.state == SubscriptionState::Pending && self.last_failure.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.state == SubscriptionState::Active
    }

    pub fn status(&self) -> SubscriptionStatus {
        match self.state {
            SubscriptionState::Pending if self.last_failure.is_some() => SubscriptionStatus::Failed,
            SubscriptionState::Pending => SubscriptionStatus::Pending,
            SubscriptionState::Active => SubscriptionStatus::Active,
            SubscriptionState::Cancelled => SubscriptionStatus::Cancelled,
        }
    }

    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            feed_spec: self.feed_spec.clone(),
            status: self.status(),
            subscriber_count: self.subscriber_count,
            fully_qualified: self.fully_qualified.clone(),
            last_failure: self.last_failure.clone(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExternalId, TargetSpec};

    fn key(ticker: &str) -> ValueKey {
        ValueKey::new("Market_Value", TargetSpec::primitive(&ExternalId::of("Foo", ticker)))
    }

    fn subscription() -> Subscription {
        Subscription::new(FeedSpec::new("OpenGamma", ExternalId::of("Foo", "test1")))
    }

    #[test]
    fn test_subscribers_are_counted_per_reference() {
        let mut sub = subscription();
        assert!(sub.add_subscriber(key("a")));
        assert!(!sub.add_subscriber(key("a")));
        assert!(sub.add_subscriber(key("b")));
        assert_eq!(sub.subscriber_count(), 3);
        assert_eq!(sub.keys().count(), 2);

        assert_eq!(sub.remove_subscriber(&key("a")), Some(false));
        assert_eq!(sub.remove_subscriber(&key("a")), Some(true));
        assert_eq!(sub.remove_subscriber(&key("a")), None);
        assert!(!sub.is_orphaned());

        assert_eq!(sub.remove_subscriber(&key("b")), Some(true));
        assert!(sub.is_orphaned());
    }

    #[test]
    fn test_lifecycle() {
        let mut sub = subscription();
        sub.add_subscriber(key("a"));
        assert_eq!(sub.status(), SubscriptionStatus::Pending);
        assert!(sub.awaiting_response());

        sub.record_failure("no such line");
        assert_eq!(sub.status(), SubscriptionStatus::Failed);
        assert!(!sub.awaiting_response());

        let fq = sub.feed_spec().as_fully_qualified();
        assert_eq!(sub.activate(fq.clone()), None);
        assert_eq!(sub.status(), SubscriptionStatus::Active);
        assert!(sub.last_failure().is_none());
        assert_eq!(sub.activate(fq.clone()), None);

        let moved = FullyQualifiedSpec::new("OpenGamma", ExternalId::of("Foo", "other"));
        assert_eq!(sub.activate(moved.clone()), Some(fq));

        assert_eq!(sub.cancel(), Some(moved));
        assert_eq!(sub.status(), SubscriptionStatus::Cancelled);
        assert!(sub.fully_qualified().is_none());
        assert!(sub.is_orphaned());
    }

    #[test]
    fn test_info_reflects_state() {
        let mut sub = subscription();
        sub.add_subscriber(key("a"));
        sub.add_subscriber(key("a"));
        let info = sub.info();
        assert_eq!(info.status.as_str(), "PENDING");
        assert_eq!(info.subscriber_count, 2);
        assert!(info.fully_qualified.is_none());
    }
}
