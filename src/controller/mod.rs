//! # Controller
//!
//! Reconciliation machinery shared by all kinds and the kind reconcilers
//! built on it.
//!
//! - `engine` - generic reconcile loop with failure classification
//! - `pipeline` - condition-guarded stage execution
//! - `failure_tracker` - consecutive identical failure counting
//! - `store`, `resolver`, `exec`, `converge`, `scripts` - platform seams
//! - `resources` - rendered native manifests
//! - `reconciler` - one reconciler per kind
//! - `server` - metrics and probe endpoints

pub mod converge;
pub mod engine;
pub mod error;
pub mod exec;
pub mod failure_tracker;
pub mod pipeline;
pub mod reconciler;
pub mod resolver;
pub mod resources;
pub mod scripts;
pub mod server;
pub mod store;

pub use engine::{Engine, EngineSettings, KindOutcome, KindReconciler, ReconcileOutcome};
pub use error::{ErrorClass, ReconcilerError, ScriptExecutionFailed};
pub use failure_tracker::FailureTracker;
