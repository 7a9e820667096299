//! Point-in-time views over the last-known-value store

use crate::lkv::LastKnownValueStore;
use crate::types::MarketValue;
use chrono::{DateTime, Utc};
use common::ValueKey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A stable read view handed to one calculation cycle
///
/// Values are copied out of the store when the snapshot is taken. `init`
/// may add values for required keys that arrive during its bounded wait;
/// nothing changes the snapshot after `init` returns.
#[derive(Debug)]
pub struct LiveDataSnapshot {
    store: Arc<LastKnownValueStore>,
    values: HashMap<ValueKey, MarketValue>,
    snapshot_time: DateTime<Utc>,
    initialized: bool,
}

impl LiveDataSnapshot {
    pub(crate) fn new(store: Arc<LastKnownValueStore>, values: HashMap<ValueKey, MarketValue>) -> Self {
        Self {
            store,
            values,
            snapshot_time: Utc::now(),
            initialized: false,
        }
    }

    /// Wait up to `timeout` for values of `required` keys that are not yet
    /// present. Returns the keys still missing when the wait ended; missing
    /// keys are not an error and simply query as `None`.
    pub fn init(&mut self, required: &HashSet<ValueKey>, timeout: Duration) -> HashSet<ValueKey> {
        let deadline = Instant::now() + timeout;
        let mut missing: HashSet<ValueKey> = required
            .iter()
            .filter(|key| !self.values.contains_key(*key))
            .cloned()
            .collect();

        while !missing.is_empty() {
            let generation = self.store.generation();
            for (key, value) in self.store.get_many(missing.iter()) {
                missing.remove(&key);
                self.values.insert(key, value);
            }
            if missing.is_empty() || !self.store.wait_for_change(generation, deadline) {
                break;
            }
        }

        if !missing.is_empty() {
            debug!(
                missing = missing.len(),
                timeout_ms = timeout.as_millis() as u64,
                "Snapshot initialised with unresolved keys"
            );
        }
        self.initialized = true;
        missing
    }

    pub fn query(&self, key: &ValueKey) -> Option<MarketValue> {
        self.values.get(key).copied()
    }

    /// Values for every key in `keys` that the snapshot holds
    pub fn query_many<'a, I>(&self, keys: I) -> HashMap<ValueKey, MarketValue>
    where
        I: IntoIterator<Item = &'a ValueKey>,
    {
        keys.into_iter()
            .filter_map(|key| self.values.get(key).map(|v| (key.clone(), *v)))
            .collect()
    }

    pub fn snapshot_time(&self) -> DateTime<Utc> {
        self.snapshot_time
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn keys(&self) -> impl Iterator<Item = &ValueKey> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExternalId, TargetSpec};
    use std::thread;

    fn key(ticker: &str) -> ValueKey {
        ValueKey::new("Market_Value", TargetSpec::primitive(&ExternalId::of("Foo", ticker)))
    }

    #[test]
    fn test_snapshot_is_stable_after_init() {
        let store = Arc::new(LastKnownValueStore::new());
        store.put(key("a"), MarketValue::new(1.0));

        let mut snapshot = store.snapshot(None);
        let missing = snapshot.init(&HashSet::new(), Duration::ZERO);
        assert!(missing.is_empty());
        assert!(snapshot.is_initialized());

        store.put(key("a"), MarketValue::new(2.0));
        store.put(key("b"), MarketValue::new(3.0));

        assert_eq!(snapshot.query(&key("a")).map(|v| v.value), Some(1.0));
        assert!(snapshot.query(&key("b")).is_none());

        let fresh = store.snapshot(None);
        assert_eq!(fresh.query(&key("a")).map(|v| v.value), Some(2.0));
        assert_eq!(fresh.query(&key("b")).map(|v| v.value), Some(3.0));
    }

    #[test]
    fn test_filtered_snapshot() {
        let store = Arc::new(LastKnownValueStore::new());
        store.put(key("a"), MarketValue::new(1.0));
        store.put(key("b"), MarketValue::new(2.0));

        let filter: HashSet<ValueKey> = [key("b"), key("zzz")].into_iter().collect();
        let snapshot = store.snapshot(Some(&filter));

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.query(&key("a")).is_none());
        assert_eq!(snapshot.query_many(filter.iter()).len(), 1);
    }

    #[test]
    fn test_init_times_out_on_missing_key() {
        let store = Arc::new(LastKnownValueStore::new());
        let mut snapshot = store.snapshot(None);
        let required: HashSet<ValueKey> = [key("never")].into_iter().collect();

        let started = Instant::now();
        let missing = snapshot.init(&required, Duration::from_millis(30));

        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(missing, required);
        assert!(snapshot.query(&key("never")).is_none());
    }

    #[test]
    fn test_init_returns_early_when_required_value_arrives() {
        let store = Arc::new(LastKnownValueStore::new());
        let mut snapshot = store.snapshot(None);
        let required: HashSet<ValueKey> = [key("late")].into_iter().collect();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.put(key("other"), MarketValue::new(0.5));
                thread::sleep(Duration::from_millis(20));
                store.put(key("late"), MarketValue::new(7.0));
            })
        };

        let started = Instant::now();
        let missing = snapshot.init(&required, Duration::from_secs(10));
        writer.join().unwrap();

        assert!(missing.is_empty());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(snapshot.query(&key("late")).map(|v| v.value), Some(7.0));
        // only required keys are pulled in during the wait
        assert!(snapshot.query(&key("other")).is_none());
    }
}
