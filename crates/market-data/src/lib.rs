//! Live market data subscription manager and last-known-value cache
//!
//! Sits between a calculation engine's data requirements and an external
//! live data feed. The engine subscribes to [`ValueKey`](common::ValueKey)s;
//! the manager resolves each key to a [`FeedSpec`], sends one request per
//! distinct spec, reconciles the feed's asynchronous responses and writes
//! ticks into a [`LastKnownValueStore`] that the engine reads through
//! [`LiveDataSnapshot`]s.
//!
//! # Modules
//!
//! - [`manager`] - Subscription lifecycle, deduplication and fan-out
//! - [`subscription`] - The per-feed-spec subscription aggregate
//! - [`lkv`] - Last-known-value store
//! - [`snapshot`] - Point-in-time views with bounded initialisation
//! - [`resolver`] - Key to feed spec resolution
//! - [`resubscribe`] - Bulk resubscription on scheme changes
//! - [`feed`] - Feed client/listener seams, recording and simulated feeds
//! - [`listener`] - Notifications to the calculation engine

pub mod error;
pub mod feed;
pub mod listener;
pub mod lkv;
pub mod manager;
pub mod resolver;
pub mod resubscribe;
pub mod snapshot;
pub mod subscription;
pub mod types;

mod dispatch;

pub use error::MarketDataError;
pub use feed::{
    FeedClient, FeedListener, RecordingFeedClient, SimulatedFeed, SimulatedFeedClient, SimulationSettings,
    SubscriptionOutcome, SubscriptionResponse,
};
pub use listener::MarketDataListener;
pub use lkv::LastKnownValueStore;
pub use manager::{SubscribeOutcome, SubscriptionManager};
pub use resolver::{AvailabilityResolver, ChainedResolver, FixedAvailabilityResolver, PropertyResolver};
pub use resubscribe::{ResubscriptionController, SchemeChange};
pub use snapshot::LiveDataSnapshot;
pub use subscription::Subscription;
pub use types::*;

/// Result type alias for market data operations
pub type Result<T> = std::result::Result<T, MarketDataError>;
