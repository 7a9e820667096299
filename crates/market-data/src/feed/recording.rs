//! Feed client that records requests instead of sending them

use super::FeedClient;
use crate::types::{FeedSpec, FullyQualifiedSpec};
use parking_lot::Mutex;

/// Records every subscribe batch and cancel request for later inspection
///
/// Used by tests and by tooling that drives responses and ticks by hand.
#[derive(Debug, Default)]
pub struct RecordingFeedClient {
    subscription_requests: Mutex<Vec<Vec<FeedSpec>>>,
    cancel_requests: Mutex<Vec<FullyQualifiedSpec>>,
}

impl RecordingFeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe batches in the order they were issued (resubscribes included)
    pub fn subscription_requests(&self) -> Vec<Vec<FeedSpec>> {
        self.subscription_requests.lock().clone()
    }

    /// Cancelled streams, one entry per cancelled spec
    pub fn cancel_requests(&self) -> Vec<FullyQualifiedSpec> {
        self.cancel_requests.lock().clone()
    }

    /// Remove and return the recorded subscribe batches
    pub fn take_subscription_requests(&self) -> Vec<Vec<FeedSpec>> {
        std::mem::take(&mut *self.subscription_requests.lock())
    }

    pub fn subscription_request_count(&self) -> usize {
        self.subscription_requests.lock().len()
    }

    pub fn cancel_request_count(&self) -> usize {
        self.cancel_requests.lock().len()
    }

    pub fn clear(&self) {
        self.subscription_requests.lock().clear();
        self.cancel_requests.lock().clear();
    }
}

impl FeedClient for RecordingFeedClient {
    fn subscribe(&self, specs: &[FeedSpec]) {
        self.subscription_requests.lock().push(specs.to_vec());
    }

    fn unsubscribe(&self, specs: &[FullyQualifiedSpec]) {
        self.cancel_requests.lock().extend_from_slice(specs);
    }
}
