//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliations, requeues, give-ups and notifications
//! - `pipeline_metrics` - Pipeline stages and remote commands

pub mod controller_metrics;
pub mod pipeline_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use pipeline_metrics::*;
pub use registry::*;
