//! Market data error types

use common::ValueKey;
use thiserror::Error;

/// Errors that can occur during market data operations
///
/// Feed-reported subscription failures are not errors: they are recorded on
/// the subscription and surfaced through its status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// The availability layer cannot map the key to a feed line
    #[error("Market data not available for {key}: {reason}")]
    NotAvailable { key: ValueKey, reason: String },

    /// A feed specification could not be built
    #[error("Invalid feed specification: {0}")]
    InvalidSpec(String),

    /// Subscription error
    #[error("Subscription error: {0}")]
    Subscription(String),
}

impl MarketDataError {
    pub fn not_available(key: &ValueKey, reason: impl Into<String>) -> Self {
        Self::NotAvailable {
            key: key.clone(),
            reason: reason.into(),
        }
    }
}
