//! Last-known-value store
//!
//! Thread-safe map from [`ValueKey`] to the most recent [`MarketValue`]
//! received for it. Reads take a shared lock; a generation counter guarded
//! by a mutex/condvar pair lets snapshot initialisation block until new
//! values arrive.

use crate::snapshot::LiveDataSnapshot;
use crate::types::MarketValue;
use common::ValueKey;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
pub struct LastKnownValueStore {
    values: RwLock<HashMap<ValueKey, MarketValue>>,
    change_count: AtomicU64,
    generation: Mutex<u64>,
    updated: Condvar,
}

impl LastKnownValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value for `key`, or `None` if it never ticked or is not subscribed
    pub fn get(&self, key: &ValueKey) -> Option<MarketValue> {
        self.values.read().get(key).copied()
    }

    pub fn contains(&self, key: &ValueKey) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn put(&self, key: ValueKey, value: MarketValue) {
        self.put_all(std::iter::once((key, value)));
    }

    /// Write a batch of values under a single lock acquisition and wake waiters once
    pub fn put_all<I>(&self, updates: I) -> usize
    where
        I: IntoIterator<Item = (ValueKey, MarketValue)>,
    {
        let written = {
            let mut values = self.values.write();
            let mut written = 0;
            for (key, value) in updates {
                values.insert(key, value);
                written += 1;
            }
            written
        };

        if written > 0 {
            self.change_count.fetch_add(written as u64, Ordering::Relaxed);
            let mut generation = self.generation.lock();
            *generation += 1;
            self.updated.notify_all();
        }
        written
    }

    pub fn remove(&self, key: &ValueKey) -> Option<MarketValue> {
        self.values.write().remove(key)
    }

    pub fn remove_all<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a ValueKey>,
    {
        let mut values = self.values.write();
        for key in keys {
            values.remove(key);
        }
    }

    /// All keys currently holding a value
    pub fn all_value_keys(&self) -> HashSet<ValueKey> {
        self.values.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Number of value writes since the store was created
    pub fn change_count(&self) -> u64 {
        self.change_count.load(Ordering::Relaxed)
    }

    /// Capture a point-in-time view, optionally restricted to `filter`
    pub fn snapshot(self: &Arc<Self>, filter: Option<&HashSet<ValueKey>>) -> LiveDataSnapshot {
        let values = {
            let values = self.values.read();
            match filter {
                Some(keys) => keys
                    .iter()
                    .filter_map(|key| values.get(key).map(|v| (key.clone(), *v)))
                    .collect(),
                None => values.clone(),
            }
        };
        LiveDataSnapshot::new(Arc::clone(self), values)
    }

    pub(crate) fn get_many<'a, I>(&self, keys: I) -> Vec<(ValueKey, MarketValue)>
    where
        I: IntoIterator<Item = &'a ValueKey>,
    {
        let values = self.values.read();
        keys.into_iter()
            .filter_map(|key| values.get(key).map(|v| (key.clone(), *v)))
            .collect()
    }

    pub(crate) fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Block until a write lands after generation `since`, or `deadline` passes.
    /// Returns false on timeout with nothing new written.
    pub(crate) fn wait_for_change(&self, since: u64, deadline: Instant) -> bool {
        let mut generation = self.generation.lock();
        while *generation == since {
            if self.updated.wait_until(&mut generation, deadline).timed_out() {
                return *generation != since;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ExternalId, TargetSpec};
    use std::thread;
    use std::time::Duration;

    fn key(ticker: &str) -> ValueKey {
        ValueKey::new("Market_Value", TargetSpec::primitive(&ExternalId::of("Foo", ticker)))
    }

    #[test]
    fn test_put_and_get() {
        let store = LastKnownValueStore::new();
        assert!(store.get(&key("a")).is_none());

        store.put(key("a"), MarketValue::new(1.5));
        store.put(key("a"), MarketValue::new(1.75));

        assert_eq!(store.get(&key("a")).map(|v| v.value), Some(1.75));
        assert_eq!(store.len(), 1);
        assert_eq!(store.change_count(), 2);
    }

    #[test]
    fn test_remove_all() {
        let store = LastKnownValueStore::new();
        store.put_all(vec![
            (key("a"), MarketValue::new(1.0)),
            (key("b"), MarketValue::new(2.0)),
            (key("c"), MarketValue::new(3.0)),
        ]);

        store.remove_all([key("a"), key("b")].iter());

        assert_eq!(store.all_value_keys(), [key("c")].into_iter().collect());
    }

    #[test]
    fn test_wait_for_change_times_out() {
        let store = LastKnownValueStore::new();
        let generation = store.generation();
        let woke = store.wait_for_change(generation, Instant::now() + Duration::from_millis(20));
        assert!(!woke);
    }

    #[test]
    fn test_wait_for_change_wakes_on_write() {
        let store = Arc::new(LastKnownValueStore::new());
        let generation = store.generation();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                store.put(key("a"), MarketValue::new(9.0));
            })
        };

        let woke = store.wait_for_change(generation, Instant::now() + Duration::from_secs(5));
        writer.join().unwrap();

        assert!(woke);
        assert!(store.contains(&key("a")));
    }
}
