//! Identifier and key types shared across the live data crates
//!
//! Every type here is an immutable value object with explicit equality and
//! hashing, so two independently built instances describing the same thing
//! compare equal and deduplicate in sets and maps.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Separator used in the textual form of identifiers (`SCHEME~value`)
pub const ID_SEPARATOR: char = '~';

/// Well-known value property names
pub mod property_names {
    /// Function that produced (or will produce) the value
    pub const FUNCTION: &str = "Function";
    /// Normalization rule set the feed should apply
    pub const NORMALIZATION: &str = "Normalization";
    /// External identifier of the market data line
    pub const ID: &str = "Id";
}

/// Well-known value names (market data fields)
pub mod value_names {
    pub const MARKET_VALUE: &str = "Market_Value";
    pub const BID: &str = "Bid";
    pub const ASK: &str = "Ask";
    pub const LAST: &str = "Last";
}

/// Identifier scheme (e.g., "ACTIVFEED_TICKER", "BLOOMBERG_TICKER")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalScheme(pub String);

impl ExternalScheme {
    /// Create a new scheme
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the scheme as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExternalScheme {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ExternalScheme {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// An identifier issued by an external authority (a ticker, an ISIN, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalId {
    scheme: ExternalScheme,
    value: String,
}

impl ExternalId {
    /// Create an identifier from a scheme and a value
    pub fn of(scheme: impl Into<ExternalScheme>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    pub fn scheme(&self) -> &ExternalScheme {
        &self.scheme
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.scheme, ID_SEPARATOR, self.value)
    }
}

impl FromStr for ExternalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(ID_SEPARATOR) {
            Some((scheme, value)) if !scheme.is_empty() && !value.is_empty() => {
                Ok(Self::of(scheme, value))
            }
            _ => Err(Error::invalid_input(format!(
                "external id '{}' is not of the form SCHEME{}value",
                s, ID_SEPARATOR
            ))),
        }
    }
}

/// An unordered set of identifiers that all refer to the same thing
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalIdBundle(BTreeSet<ExternalId>);

impl ExternalIdBundle {
    /// Create a bundle holding a single identifier
    pub fn of(id: ExternalId) -> Self {
        let mut ids = BTreeSet::new();
        ids.insert(id);
        Self(ids)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExternalId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First identifier in scheme/value order
    pub fn first(&self) -> Option<&ExternalId> {
        self.0.iter().next()
    }

    /// Returns true if any identifier in the bundle belongs to `scheme`
    pub fn contains_scheme(&self, scheme: &ExternalScheme) -> bool {
        self.0.iter().any(|id| id.scheme() == scheme)
    }

    /// Value of the identifier with the given scheme, if present
    pub fn value_of(&self, scheme: &ExternalScheme) -> Option<&str> {
        self.0
            .iter()
            .find(|id| id.scheme() == scheme)
            .map(|id| id.value())
    }
}

impl FromIterator<ExternalId> for ExternalIdBundle {
    fn from_iter<I: IntoIterator<Item = ExternalId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<ExternalId> for ExternalIdBundle {
    fn from(id: ExternalId) -> Self {
        Self::of(id)
    }
}

impl std::fmt::Display for ExternalIdBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Bundle[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "]")
    }
}

/// Identifier of an object held by this system
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueId {
    pub scheme: String,
    pub value: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl UniqueId {
    pub fn of(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(
                f,
                "{}{sep}{}{sep}{}",
                self.scheme,
                self.value,
                version,
                sep = ID_SEPARATOR
            ),
            None => write!(f, "{}{}{}", self.scheme, ID_SEPARATOR, self.value),
        }
    }
}

/// Kind of object a calculation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A bare identifier with no backing object (e.g., a ticker)
    Primitive,
    /// A security from the security master
    Security,
    /// A position in a portfolio
    Position,
    /// A single trade
    Trade,
    /// A whole portfolio node
    Portfolio,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetType::Primitive => write!(f, "PRIMITIVE"),
            TargetType::Security => write!(f, "SECURITY"),
            TargetType::Position => write!(f, "POSITION"),
            TargetType::Trade => write!(f, "TRADE"),
            TargetType::Portfolio => write!(f, "PORTFOLIO"),
        }
    }
}

/// The object a value is calculated for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetSpec {
    pub target_type: TargetType,
    pub unique_id: UniqueId,
}

impl TargetSpec {
    pub fn new(target_type: TargetType, unique_id: UniqueId) -> Self {
        Self {
            target_type,
            unique_id,
        }
    }

    /// Target for a bare external identifier, as used for raw market data lines
    pub fn primitive(id: &ExternalId) -> Self {
        Self::new(
            TargetType::Primitive,
            UniqueId::of("ExternalId", id.to_string()),
        )
    }
}

impl std::fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CTSpec[{}, {}]", self.target_type, self.unique_id)
    }
}

/// Application-level key for one market data requirement
///
/// A key names a value (e.g. `Market_Value`), the target it is for, and a
/// sorted set of properties describing how the value is sourced. The
/// `Normalization` and `Id` properties are what the availability layer reads
/// to work out which feed line backs the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueKey {
    value_name: String,
    target: TargetSpec,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl ValueKey {
    pub fn new(value_name: impl Into<String>, target: TargetSpec) -> Self {
        Self {
            value_name: value_name.into(),
            target,
            properties: BTreeMap::new(),
        }
    }

    /// Add (or replace) a property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

impl std::fmt::Display for ValueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VKey[{}, {}, {{", self.value_name, self.target)?;
        for (i, (name, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}=[{}]", name, value)?;
        }
        write!(f, "}}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_id_round_trip() {
        let id: ExternalId = "ACTIVFEED_TICKER~AAPL.".parse().unwrap();
        assert_eq!(id.scheme().as_str(), "ACTIVFEED_TICKER");
        assert_eq!(id.value(), "AAPL.");
        assert_eq!(id.to_string(), "ACTIVFEED_TICKER~AAPL.");
    }

    #[test]
    fn test_external_id_rejects_missing_separator() {
        assert!("AAPL".parse::<ExternalId>().is_err());
        assert!("~AAPL".parse::<ExternalId>().is_err());
        assert!("SCHEME~".parse::<ExternalId>().is_err());
    }

    #[test]
    fn test_bundle_scheme_lookup() {
        let bundle: ExternalIdBundle = [
            ExternalId::of("BLOOMBERG_TICKER", "AAPL US Equity"),
            ExternalId::of("ACTIVFEED_TICKER", "AAPL."),
        ]
        .into_iter()
        .collect();

        assert_eq!(bundle.len(), 2);
        assert!(bundle.contains_scheme(&"ACTIVFEED_TICKER".into()));
        assert!(!bundle.contains_scheme(&"RIC".into()));
        assert_eq!(bundle.value_of(&"BLOOMBERG_TICKER".into()), Some("AAPL US Equity"));
        assert_eq!(bundle.first().unwrap().scheme().as_str(), "ACTIVFEED_TICKER");
    }

    #[test]
    fn test_value_key_equality_ignores_property_insertion_order() {
        let target = TargetSpec::primitive(&ExternalId::of("Foo", "test1"));
        let a = ValueKey::new(value_names::MARKET_VALUE, target.clone())
            .with_property(property_names::FUNCTION, "MarketData")
            .with_property(property_names::ID, "Foo~test1");
        let b = ValueKey::new(value_names::MARKET_VALUE, target)
            .with_property(property_names::ID, "Foo~test1")
            .with_property(property_names::FUNCTION, "MarketData");

        assert_eq!(a, b);
        assert_eq!(a.property(property_names::ID), Some("Foo~test1"));
    }

    #[test]
    fn test_value_key_display() {
        let key = ValueKey::new(
            "Market_All",
            TargetSpec::new(TargetType::Security, UniqueId::of("DbSec", "1234").with_version("1")),
        )
        .with_property("Normalization", "OpenGamma");
        assert_eq!(
            key.to_string(),
            "VKey[Market_All, CTSpec[SECURITY, DbSec~1234~1], {Normalization=[OpenGamma]}]"
        );
    }
}
