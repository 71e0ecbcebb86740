//! # Pipeline Metrics
//!
//! Metrics for pipeline stages and the remote commands they issue.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::IntCounterVec;
use std::sync::LazyLock;

static PIPELINE_STAGES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "jenkins_operator_pipeline_stages_total",
            "Total number of pipeline stages executed",
        ),
        &["stage", "result"],
    )
    .expect("Failed to create PIPELINE_STAGES_TOTAL metric - this should never happen")
});

static REMOTE_COMMANDS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "jenkins_operator_remote_commands_total",
            "Total number of commands executed in Jenkins pods",
        ),
        &["result"],
    )
    .expect("Failed to create REMOTE_COMMANDS_TOTAL metric - this should never happen")
});

/// Register pipeline metrics with the registry
pub(crate) fn register_pipeline_metrics() -> Result<()> {
    REGISTRY.register(Box::new(PIPELINE_STAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REMOTE_COMMANDS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_pipeline_stage(stage: &str, result: &str) {
    PIPELINE_STAGES_TOTAL
        .with_label_values(&[stage, result])
        .inc();
}

pub fn increment_remote_commands(result: &str) {
    REMOTE_COMMANDS_TOTAL.with_label_values(&[result]).inc();
}
