//! Notifications from the subscription manager to the calculation engine

use common::ValueKey;

/// Observer of subscription lifecycle and value changes
///
/// Called after the manager's state lock is released, in the order the
/// underlying transitions happened. Implementations may call back into the
/// manager.
#[cfg_attr(test, mockall::automock)]
pub trait MarketDataListener: Send + Sync {
    /// Keys whose subscription became (or already was) active
    fn subscriptions_succeeded(&self, keys: &[ValueKey]);

    /// Keys that cannot be served, with the reason
    fn subscription_failed(&self, keys: &[ValueKey], reason: &str);

    /// Keys that no longer hold any demand
    fn subscriptions_stopped(&self, keys: &[ValueKey]);

    /// Keys that received a new value
    fn values_changed(&self, keys: &[ValueKey]);
}
