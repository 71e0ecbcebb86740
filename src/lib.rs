//! # Jenkins Operator
//!
//! A Kubernetes operator that runs Jenkins instances and drives backups,
//! restores and custom image builds for them.
//!
//! ## Overview
//!
//! Every kind is reconciled by the same engine:
//!
//! 1. **Fetch** the latest object and seed its lifecycle conditions
//! 2. **Reconcile** through the kind's reconciler
//! 3. **Record** the outcome as conditions and decide on requeue
//!
//! One-shot kinds (`Backup`, `Restore`, `JenkinsImage`) run a pipeline of
//! stages guarded by status conditions, so a replayed request never redoes
//! a completed stage. Failures repeating with the same error are counted
//! and the operator gives up once the limit is reached.
//!
//! ## Modules
//!
//! - `crd` - custom resource types and the condition store
//! - `controller` - engine, pipeline, platform seams and kind reconcilers
//! - `notifications` - operator events published as Kubernetes events
//! - `config` - environment-driven configuration
//! - `observability` - Prometheus metrics
//! - `runtime` - initialization and the watch loop

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod notifications;
pub mod observability;
pub mod runtime;
