//! Shared types for live market data

use chrono::{DateTime, Utc};
use common::{ExternalIdBundle, ExternalScheme};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A feed line identity: normalization rule set plus identifier bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiveDataSpec {
    pub normalization: String,
    pub identifiers: ExternalIdBundle,
}

impl LiveDataSpec {
    pub fn new(normalization: impl Into<String>, identifiers: impl Into<ExternalIdBundle>) -> Self {
        Self {
            normalization: normalization.into(),
            identifiers: identifiers.into(),
        }
    }

    /// Returns true if any identifier belongs to one of `schemes`
    pub fn matches_any_scheme(&self, schemes: &HashSet<ExternalScheme>) -> bool {
        self.identifiers.iter().any(|id| schemes.contains(id.scheme()))
    }
}

impl std::fmt::Display for LiveDataSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LiveDataSpec[{}:{}]", self.normalization, self.identifiers)
    }
}

/// Request-time feed identity derived from a key; the unit of deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedSpec(LiveDataSpec);

impl FeedSpec {
    pub fn new(normalization: impl Into<String>, identifiers: impl Into<ExternalIdBundle>) -> Self {
        Self(LiveDataSpec::new(normalization, identifiers))
    }

    pub fn spec(&self) -> &LiveDataSpec {
        &self.0
    }

    pub fn normalization(&self) -> &str {
        &self.0.normalization
    }

    pub fn identifiers(&self) -> &ExternalIdBundle {
        &self.0.identifiers
    }

    /// The fully-qualified form of this exact request, for feeds that echo
    /// the requested identity back
    pub fn as_fully_qualified(&self) -> FullyQualifiedSpec {
        FullyQualifiedSpec(self.0.clone())
    }
}

impl From<LiveDataSpec> for FeedSpec {
    fn from(spec: LiveDataSpec) -> Self {
        Self(spec)
    }
}

impl std::fmt::Display for FeedSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical stream identity assigned by the feed in a subscription response
///
/// Ticks are addressed by this identity. Several feed specs may resolve to
/// the same fully-qualified spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FullyQualifiedSpec(LiveDataSpec);

impl FullyQualifiedSpec {
    pub fn new(normalization: impl Into<String>, identifiers: impl Into<ExternalIdBundle>) -> Self {
        Self(LiveDataSpec::new(normalization, identifiers))
    }

    pub fn spec(&self) -> &LiveDataSpec {
        &self.0
    }
}

impl From<LiveDataSpec> for FullyQualifiedSpec {
    fn from(spec: LiveDataSpec) -> Self {
        Self(spec)
    }
}

impl std::fmt::Display for FullyQualifiedSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tick payload: named numeric fields as delivered by the feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMessage {
    fields: BTreeMap<String, f64>,
}

impl FieldMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any previous value with the same name
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A value held in the last-known-value store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketValue {
    pub value: f64,
    pub received_at: DateTime<Utc>,
}

impl MarketValue {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            received_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionState {
    /// Request sent, no successful response yet
    Pending,
    /// Feed confirmed the subscription; ticks are being fanned out
    Active,
    /// Terminal; the subscription is discarded
    Cancelled,
}

/// Externally observable status of a subscription
///
/// `Failed` is a pending subscription whose last response was a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Pending,
    Failed,
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "PENDING",
            SubscriptionStatus::Failed => "FAILED",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic view of one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub feed_spec: FeedSpec,
    pub status: SubscriptionStatus,
    pub subscriber_count: usize,
    pub fully_qualified: Option<FullyQualifiedSpec>,
    pub last_failure: Option<String>,
    pub created_at: DateTime<Utc>,
}
