//! Observability infrastructure for the live data service
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics exporter
//! - The live data metric set ([`LiveDataMetrics`])
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! // Initialize logging
//! init_logging("lkv", LogFormat::Pretty)?;
//!
//! // Initialize metrics (optional)
//! observability::metrics::init_metrics(9090)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{init_metrics, LiveDataMetrics, SnapshotInitTimer};
