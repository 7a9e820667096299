//! Resolution of application keys to feed specifications
//!
//! Distinct keys may resolve to the same [`FeedSpec`]; the subscription
//! manager deduplicates on the resolved spec.

use crate::error::MarketDataError;
use crate::types::FeedSpec;
use crate::Result;
use common::{property_names, ExternalId, TargetSpec, UniqueId, ValueKey};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps a key to the feed line that backs it
pub trait AvailabilityResolver: Send + Sync {
    /// Resolve `key`, failing with [`MarketDataError::NotAvailable`] if no feed line backs it
    fn resolve(&self, key: &ValueKey) -> Result<FeedSpec>;
}

/// Reads the `Id` and `Normalization` properties carried on the key
///
/// Keys produced by the availability layer carry the external identifier of
/// their market data line; keys without a normalization property use the
/// configured default rule set.
#[derive(Debug, Clone)]
pub struct PropertyResolver {
    default_normalization: String,
}

impl PropertyResolver {
    pub fn new(default_normalization: impl Into<String>) -> Self {
        Self {
            default_normalization: default_normalization.into(),
        }
    }
}

impl AvailabilityResolver for PropertyResolver {
    fn resolve(&self, key: &ValueKey) -> Result<FeedSpec> {
        let id = key
            .property(property_names::ID)
            .ok_or_else(|| MarketDataError::not_available(key, "no Id property"))?;
        let id: ExternalId = id
            .parse()
            .map_err(|e: common::Error| MarketDataError::not_available(key, e.to_string()))?;
        let normalization = key
            .property(property_names::NORMALIZATION)
            .unwrap_or(self.default_normalization.as_str());
        Ok(FeedSpec::new(normalization, id))
    }
}

/// Explicit table from computation target to feed line
#[derive(Debug, Default)]
pub struct FixedAvailabilityResolver {
    entries: RwLock<HashMap<UniqueId, FeedSpec>>,
}

impl FixedAvailabilityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, target: UniqueId, spec: FeedSpec) {
        self.entries.write().insert(target, spec);
    }

    /// Make a bare ticker available; keys targeting it as a primitive resolve to `spec`
    pub fn add_ticker(&self, ticker: &ExternalId, spec: FeedSpec) {
        self.add(TargetSpec::primitive(ticker).unique_id, spec);
    }

    pub fn remove(&self, target: &UniqueId) -> Option<FeedSpec> {
        self.entries.write().remove(target)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl AvailabilityResolver for FixedAvailabilityResolver {
    fn resolve(&self, key: &ValueKey) -> Result<FeedSpec> {
        self.entries
            .read()
            .get(&key.target().unique_id)
            .cloned()
            .ok_or_else(|| MarketDataError::not_available(key, "target not in availability table"))
    }
}

/// Tries each resolver in order; the first success wins
#[derive(Clone, Default)]
pub struct ChainedResolver {
    resolvers: Vec<Arc<dyn AvailabilityResolver>>,
}

impl ChainedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: Arc<dyn AvailabilityResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }
}

impl AvailabilityResolver for ChainedResolver {
    fn resolve(&self, key: &ValueKey) -> Result<FeedSpec> {
        let mut last_error = None;
        for resolver in &self.resolvers {
            match resolver.resolve(key) {
                Ok(spec) => return Ok(spec),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| MarketDataError::not_available(key, "no resolvers configured")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use common::TargetType;

    fn primitive_key(ticker: &str) -> ValueKey {
        let id = ExternalId::of("ACTIVFEED_TICKER", ticker);
        ValueKey::new("Market_All", TargetSpec::primitive(&id))
            .with_property(property_names::FUNCTION, "LiveMarketData")
            .with_property(property_names::NORMALIZATION, "OpenGamma")
            .with_property(property_names::ID, id.to_string())
    }

    fn security_key(ticker: &str) -> ValueKey {
        let id = ExternalId::of("ACTIVFEED_TICKER", ticker);
        ValueKey::new(
            "Market_All",
            TargetSpec::new(TargetType::Security, UniqueId::of("DbSec", "1234").with_version("1")),
        )
        .with_property(property_names::FUNCTION, "LiveMarketData")
        .with_property(property_names::NORMALIZATION, "OpenGamma")
        .with_property(property_names::ID, id.to_string())
    }

    #[test]
    fn test_distinct_keys_alias_to_one_feed_spec() {
        let resolver = PropertyResolver::new("OpenGamma");
        let primitive = resolver.resolve(&primitive_key("AAPL.")).unwrap();
        let security = resolver.resolve(&security_key("AAPL.")).unwrap();

        assert_ne!(primitive_key("AAPL."), security_key("AAPL."));
        assert_eq!(primitive, security);
        assert_eq!(primitive.normalization(), "OpenGamma");
    }

    #[test]
    fn test_property_resolver_default_normalization() {
        let resolver = PropertyResolver::new("Raw");
        let key = ValueKey::new("Market_Value", TargetSpec::primitive(&ExternalId::of("Foo", "x")))
            .with_property(property_names::ID, "Foo~x");
        assert_eq!(resolver.resolve(&key).unwrap().normalization(), "Raw");
    }

    #[test]
    fn test_property_resolver_missing_id() {
        let resolver = PropertyResolver::new("OpenGamma");
        let key = ValueKey::new("Market_Value", TargetSpec::primitive(&ExternalId::of("Foo", "x")));
        assert_matches!(resolver.resolve(&key), Err(MarketDataError::NotAvailable { .. }));

        let bad = key.with_property(property_names::ID, "no-separator");
        assert_matches!(resolver.resolve(&bad), Err(MarketDataError::NotAvailable { .. }));
    }

    #[test]
    fn test_fixed_resolver() {
        let resolver = FixedAvailabilityResolver::new();
        let ticker = ExternalId::of("Foo", "test1");
        let spec = FeedSpec::new("OpenGamma", ExternalId::of("Foo", "test1"));
        resolver.add_ticker(&ticker, spec.clone());

        let key = ValueKey::new("Market_Value", TargetSpec::primitive(&ticker));
        assert_eq!(resolver.resolve(&key).unwrap(), spec);

        let unknown = ValueKey::new("Market_Value", TargetSpec::primitive(&ExternalId::of("Foo", "nope")));
        assert!(resolver.resolve(&unknown).is_err());
    }

    #[test]
    fn test_chained_resolver_falls_through() {
        let fixed = Arc::new(FixedAvailabilityResolver::new());
        let ticker = ExternalId::of("Foo", "fixed");
        let fixed_spec = FeedSpec::new("Fixed", ticker.clone());
        fixed.add_ticker(&ticker, fixed_spec.clone());

        let chain = ChainedResolver::new()
            .with(fixed)
            .with(Arc::new(PropertyResolver::new("OpenGamma")));

        let fixed_key = ValueKey::new("Market_Value", TargetSpec::primitive(&ticker));
        assert_eq!(chain.resolve(&fixed_key).unwrap(), fixed_spec);
        assert_eq!(chain.resolve(&primitive_key("VOD.")).unwrap().normalization(), "OpenGamma");

        let nowhere = ValueKey::new("Market_Value", TargetSpec::primitive(&ExternalId::of("Foo", "nope")));
        assert_matches!(chain.resolve(&nowhere), Err(MarketDataError::NotAvailable { .. }));

        assert!(ChainedResolver::new().resolve(&nowhere).is_err());
    }
}
