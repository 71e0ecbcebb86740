//! # Image Reconciler
//!
//! Builds a custom Jenkins image once per JenkinsImage: a ConfigMap holds
//! the Dockerfile, a builder pod builds and pushes it, and the pod phase
//! decides the outcome.

use super::{BUILDER_POD_CREATED, DOCKERFILE_CREATED, IMAGE_BUILT};
use crate::controller::converge::ResourceConverger;
use crate::controller::engine::{KindOutcome, KindReconciler};
use crate::controller::error::ReconcilerError;
use crate::controller::pipeline::{Pipeline, PipelineStage};
use crate::controller::resolver::ReferenceResolver;
use crate::controller::resources::{builder_pod, builder_pod_name, dockerfile, dockerfile_config_map};
use crate::controller::store::ObjectStore;
use crate::crd::{
    Condition, ConditionStatus, Conditioned, ImageBuild, JenkinsImage, PHASE_BUILD_FAILED,
    PHASE_BUILD_PENDING, PHASE_BUILD_SUCCESSFUL,
};
use crate::notifications::{Event, Level, Notifier, Reason, ReasonKind, Source};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ImageReconciler {
    store: Arc<dyn ObjectStore<JenkinsImage>>,
    resolver: Arc<dyn ReferenceResolver>,
    converger: Arc<dyn ResourceConverger>,
    notifier: Arc<dyn Notifier>,
    builder_image: String,
    poll_interval: Duration,
}

impl std::fmt::Debug for ImageReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageReconciler")
            .field("builder_image", &self.builder_image)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl ImageReconciler {
    pub fn new(
        store: Arc<dyn ObjectStore<JenkinsImage>>,
        resolver: Arc<dyn ReferenceResolver>,
        converger: Arc<dyn ResourceConverger>,
        notifier: Arc<dyn Notifier>,
        builder_image: String,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            resolver,
            converger,
            notifier,
            builder_image,
            poll_interval,
        }
    }

    fn record_build(image: &mut JenkinsImage) {
        let build = ImageBuild {
            image: image.spec.to.reference(),
            md5sum: format!("{:x}", md5::compute(dockerfile(image))),
            installed_plugins: image.spec.plugins.clone(),
            built_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        let status = image.status.get_or_insert_with(Default::default);
        status.builds.push(build);
        status.phase = Some(PHASE_BUILD_SUCCESSFUL.to_string());
    }
}

#[async_trait]
impl KindReconciler<JenkinsImage> for ImageReconciler {
    async fn reconcile(&self, image: &mut JenkinsImage) -> Result<KindOutcome, ReconcilerError> {
        let name = image.name_any();
        if image.has_condition(IMAGE_BUILT) {
            debug!("JenkinsImage {} already built", name);
            return Ok(KindOutcome::Skipped);
        }

        let config_map = dockerfile_config_map(image)?;
        let pod = builder_pod(image, &self.builder_image)?;
        let converger = self.converger.as_ref();
        let stages = vec![
            PipelineStage::new("dockerfile", DOCKERFILE_CREATED, move || async move {
                converger.apply(&config_map).await.map(|_| ())
            }),
            PipelineStage::new("builder-pod", BUILDER_POD_CREATED, move || async move {
                converger.apply(&pod).await.map(|_| ())
            }),
        ];
        let report = Pipeline::new(Arc::clone(&self.store))
            .run(image, stages)
            .await?;
        if let Some(stage) = report.halted {
            debug!("JenkinsImage {} stopped at failed stage {}", name, stage);
            return Ok(KindOutcome::Skipped);
        }

        let namespace = image.namespace().unwrap_or_else(|| "default".to_string());
        let pod_name = builder_pod_name(image);
        let phase = self.resolver.pod_phase(&namespace, &pod_name).await?;

        match phase.as_deref() {
            Some("Succeeded") => {
                Self::record_build(image);
                image.set_condition(Condition::new(
                    IMAGE_BUILT,
                    ConditionStatus::True,
                    "BuildSucceeded",
                    format!("Image {} built", image.spec.to.reference()),
                ));
                info!("🐳 JenkinsImage {} built as {}", name, image.spec.to.reference());

                let event = Event {
                    object: image.object_ref(&()),
                    controller: "jenkinsimage",
                    level: Level::Info,
                    reason: Reason::new(
                        ReasonKind::ImageBuildCompleted,
                        Source::Operator,
                        format!("Image {} built", image.spec.to.reference()),
                    ),
                };
                if let Err(e) = self.notifier.send(event).await {
                    warn!("Failed to send image build notification: {}", e);
                }
                Ok(KindOutcome::Converged)
            }
            Some("Failed") => {
                let message = format!("builder pod {pod_name} failed");
                image.status.get_or_insert_with(Default::default).phase =
                    Some(PHASE_BUILD_FAILED.to_string());
                image.set_condition(Condition::new(
                    IMAGE_BUILT,
                    ConditionStatus::False,
                    "BuildFailed",
                    message.clone(),
                ));
                Err(ReconcilerError::StageFailed {
                    stage: "build".to_string(),
                    message,
                })
            }
            other => {
                debug!(
                    "Builder pod {} for JenkinsImage {} is in phase {:?}",
                    pod_name, name, other
                );
                image.status.get_or_insert_with(Default::default).phase =
                    Some(PHASE_BUILD_PENDING.to_string());
                Ok(KindOutcome::Pending(self.poll_interval))
            }
        }
    }

    fn failure_reason(&self, error: &ReconcilerError) -> ReasonKind {
        match error {
            ReconcilerError::StageFailed { .. } => ReasonKind::ImageBuildFailed,
            _ => ReasonKind::ReconcileLoopFailed,
        }
    }
}
