//! Common types and utilities for the live data workspace
//!
//! This crate provides the identifier and key types shared by the
//! market data core, configuration and the binary.
//!
//! # Modules
//!
//! - [`error`] - Common error types
//! - [`types`] - Identifiers (ExternalId, bundles, targets) and `ValueKey`

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
