//! # Pipeline Executor
//!
//! Runs an ordered list of stages against one object. Each stage is guarded
//! by its condition type: a stage whose condition is already present never
//! runs again, so a crash or a duplicate delivery resumes at the first
//! stage that has not run yet.
//!
//! A failing stage records its condition as False and stops the pipeline,
//! unless it is marked `continue_on_failure`. Completed stages are never
//! rolled back. A later run that meets that False condition stops there
//! again and reports the stage as `halted`.

use crate::controller::error::ReconcilerError;
use crate::controller::store::ObjectStore;
use crate::crd::{find_condition, Condition, ConditionStatus, Conditioned};
use crate::observability;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type StageFuture<'a> = BoxFuture<'a, Result<(), ReconcilerError>>;

/// A named unit of work recorded as one condition
pub struct PipelineStage<'a> {
    pub name: &'static str,
    pub condition_type: &'static str,
    /// Keep going with later stages when this one fails
    pub continue_on_failure: bool,
    run: Box<dyn FnOnce() -> StageFuture<'a> + Send + 'a>,
}

impl<'a> PipelineStage<'a> {
    pub fn new<F, Fut>(name: &'static str, condition_type: &'static str, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), ReconcilerError>> + Send + 'a,
    {
        Self {
            name,
            condition_type,
            continue_on_failure: false,
            run: Box::new(move || Box::pin(run())),
        }
    }

    #[must_use]
    pub fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }
}

impl std::fmt::Debug for PipelineStage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStage")
            .field("name", &self.name)
            .field("condition_type", &self.condition_type)
            .field("continue_on_failure", &self.continue_on_failure)
            .finish_non_exhaustive()
    }
}

/// What a pipeline run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub executed: Vec<&'static str>,
    pub skipped: Vec<&'static str>,
    /// Failed stages that were allowed to continue, with their error text
    pub failed: Vec<(&'static str, String)>,
    /// Fail-stop stage that failed on an earlier run; nothing after it ran
    pub halted: Option<&'static str>,
}

pub struct Pipeline<K> {
    store: Arc<dyn ObjectStore<K>>,
}

impl<K> std::fmt::Debug for Pipeline<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl<K> Pipeline<K>
where
    K: Conditioned + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn ObjectStore<K>>) -> Self {
        Self { store }
    }

    /// Run `stages` in order against `obj`, persisting status after each stage
    ///
    /// `obj` is replaced with the stored version after every write so later
    /// writes carry the latest resource version.
    pub async fn run(
        &self,
        obj: &mut K,
        stages: Vec<PipelineStage<'_>>,
    ) -> Result<PipelineReport, ReconcilerError> {
        let mut report = PipelineReport::default();

        for stage in stages {
            if let Some(recorded) = find_condition(obj.conditions(), stage.condition_type) {
                if recorded.status == ConditionStatus::False && !stage.continue_on_failure {
                    debug!("Stage {} failed earlier, pipeline stays stopped", stage.name);
                    report.halted = Some(stage.name);
                    return Ok(report);
                }
                debug!("Stage {} already applied, skipping", stage.name);
                report.skipped.push(stage.name);
                continue;
            }

            let PipelineStage {
                name,
                condition_type,
                continue_on_failure,
                run,
            } = stage;

            info!("▶️  Running stage {}", name);
            match run().await {
                Ok(()) => {
                    observability::metrics::increment_pipeline_stage(name, "success");
                    obj.set_condition(Condition::new(
                        condition_type,
                        ConditionStatus::True,
                        name,
                        format!("Stage {name} completed"),
                    ));
                    *obj = self.store.update_status(obj).await?;
                    report.executed.push(name);
                    info!("✅ Stage {} completed", name);
                }
                Err(e) => {
                    observability::metrics::increment_pipeline_stage(name, "failure");
                    let message = e.to_string();
                    obj.set_condition(Condition::new(
                        condition_type,
                        ConditionStatus::False,
                        message.clone(),
                        format!("Stage {name} failed"),
                    ));
                    *obj = self.store.update_status(obj).await?;
                    report.executed.push(name);

                    if continue_on_failure {
                        warn!("⚠️  Stage {} failed, continuing: {}", name, message);
                        report.failed.push((name, message));
                        continue;
                    }

                    warn!("❌ Stage {} failed, stopping pipeline: {}", name, message);
                    return Err(ReconcilerError::StageFailed {
                        stage: name.to_string(),
                        message,
                    });
                }
            }
        }

        Ok(report)
    }
}
