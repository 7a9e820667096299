//! Seams to the live data feed
//!
//! The core never talks to a transport. It issues fire-and-forget requests
//! through [`FeedClient`] and receives responses and ticks through
//! [`FeedListener`], which the subscription manager implements.

pub mod recording;
pub mod simulated;

use crate::types::{FeedSpec, FieldMessage, FullyQualifiedSpec};

pub use recording::RecordingFeedClient;
pub use simulated::{SimulatedFeed, SimulatedFeedClient, SimulationSettings};

/// Outbound requests to the feed
///
/// Calls must not block on the feed; results arrive later through a
/// [`FeedListener`]. Implementations may call back into the listener from
/// within these methods.
pub trait FeedClient: Send + Sync {
    /// Request subscriptions for a batch of feed specs
    fn subscribe(&self, specs: &[FeedSpec]);

    /// Cancel the streams identified by these fully-qualified specs
    fn unsubscribe(&self, specs: &[FullyQualifiedSpec]);

    /// Re-request already active subscriptions (e.g. after normalization
    /// rules changed). Defaults to a plain subscribe.
    fn resubscribe(&self, specs: &[FeedSpec]) {
        self.subscribe(specs);
    }
}

/// Outcome of one subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Success { fully_qualified: FullyQualifiedSpec },
    Failure { reason: String },
}

/// The feed's answer to a subscription request for `requested`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    pub requested: FeedSpec,
    pub outcome: SubscriptionOutcome,
}

impl SubscriptionResponse {
    pub fn success(requested: FeedSpec, fully_qualified: FullyQualifiedSpec) -> Self {
        Self {
            requested,
            outcome: SubscriptionOutcome::Success { fully_qualified },
        }
    }

    pub fn failure(requested: FeedSpec, reason: impl Into<String>) -> Self {
        Self {
            requested,
            outcome: SubscriptionOutcome::Failure {
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SubscriptionOutcome::Success { .. })
    }
}

/// Callbacks from the feed, possibly on a different thread from the callers
/// of the subscription manager
pub trait FeedListener: Send + Sync {
    fn subscription_result_received(&self, response: SubscriptionResponse);

    fn subscription_results_received(&self, responses: Vec<SubscriptionResponse>) {
        for response in responses {
            self.subscription_result_received(response);
        }
    }

    fn market_data_received(&self, fully_qualified: &FullyQualifiedSpec, message: &FieldMessage);
}
