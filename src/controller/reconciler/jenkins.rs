//! # Jenkins Reconciler
//!
//! Converges a Jenkins instance:
//!
//! 1. Validate the spec
//! 2. Resolve the master image (JenkinsImage build, spec, operator default)
//! 3. Create the backup volume claim and default BackupConfig when backups are on
//! 4. Apply the Deployment and Service
//! 5. Wait for the Deployment to become ready
//! 6. Apply groovy scripts that changed since the last run
//! 7. Record the image, phase and observed generation

use crate::controller::converge::{deployment_ready, ResourceConverger, Synthesizer};
use crate::controller::engine::{KindOutcome, KindReconciler};
use crate::controller::error::ReconcilerError;
use crate::controller::resolver::ReferenceResolver;
use crate::controller::resources::{backup_claim, default_backup_config};
use crate::controller::scripts::ScriptRunner;
use crate::crd::Jenkins;
use crate::notifications::ReasonKind;
use async_trait::async_trait;
use kube::ResourceExt;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info};

pub const PHASE_INITIALIZING: &str = "Initializing";
pub const PHASE_READY: &str = "Ready";

const SERVICE_TYPES: [&str; 3] = ["ClusterIP", "NodePort", "LoadBalancer"];

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("DNS label pattern is valid")
});

/// Check a Jenkins spec, returning every problem found
pub fn validate(jenkins: &Jenkins) -> Result<(), ReconcilerError> {
    let mut problems = Vec::new();

    let name = jenkins.name_any();
    if name.len() > 63 || !DNS_LABEL.is_match(&name) {
        problems.push(format!("name '{name}' is not a valid DNS-1123 label"));
    }

    let spec = &jenkins.spec;
    if spec.image.as_deref().is_some_and(|image| image.trim().is_empty()) {
        problems.push("image must not be empty".to_string());
    }
    if spec
        .jenkins_image_ref
        .as_deref()
        .is_some_and(|r| !DNS_LABEL.is_match(r))
    {
        problems.push("jenkinsImageRef must be a valid resource name".to_string());
    }
    if !(1..=65535).contains(&spec.service.port) {
        problems.push(format!(
            "service port {} must be between 1 and 65535",
            spec.service.port
        ));
    }
    if !SERVICE_TYPES.contains(&spec.service.r#type.as_str()) {
        problems.push(format!(
            "service type '{}' must be one of {}",
            spec.service.r#type,
            SERVICE_TYPES.join(", ")
        ));
    }
    if spec.backup.enabled && spec.backup.volume_size.trim().is_empty() {
        problems.push("backup volumeSize must not be empty".to_string());
    }
    if let Some(groovy) = &spec.groovy_scripts {
        for config_map in &groovy.configurations {
            if !DNS_LABEL.is_match(&config_map.name) {
                problems.push(format!(
                    "groovy script ConfigMap '{}' is not a valid name",
                    config_map.name
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ReconcilerError::Validation(problems))
    }
}

pub struct JenkinsReconciler {
    resolver: Arc<dyn ReferenceResolver>,
    converger: Arc<dyn ResourceConverger>,
    synthesizer: Arc<dyn Synthesizer>,
    scripts: ScriptRunner,
    default_image: String,
    readiness_requeue: Duration,
}

impl std::fmt::Debug for JenkinsReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsReconciler")
            .field("default_image", &self.default_image)
            .field("readiness_requeue", &self.readiness_requeue)
            .finish_non_exhaustive()
    }
}

impl JenkinsReconciler {
    pub fn new(
        resolver: Arc<dyn ReferenceResolver>,
        converger: Arc<dyn ResourceConverger>,
        synthesizer: Arc<dyn Synthesizer>,
        scripts: ScriptRunner,
        default_image: String,
        readiness_requeue: Duration,
    ) -> Self {
        Self {
            resolver,
            converger,
            synthesizer,
            scripts,
            default_image,
            readiness_requeue,
        }
    }

    /// Image for the master container
    async fn resolve_image(&self, jenkins: &Jenkins, namespace: &str) -> Result<String, ReconcilerError> {
        if let Some(image_ref) = &jenkins.spec.jenkins_image_ref {
            match self.resolver.jenkins_image(namespace, image_ref).await? {
                Some(image) => {
                    if let Some(built) = image.latest_image() {
                        return Ok(built.to_string());
                    }
                    debug!("JenkinsImage {} has no successful build yet", image_ref);
                }
                None => debug!("JenkinsImage {}/{} not found", namespace, image_ref),
            }
        }
        Ok(jenkins
            .spec
            .image
            .clone()
            .unwrap_or_else(|| self.default_image.clone()))
    }
}

#[async_trait]
impl KindReconciler<Jenkins> for JenkinsReconciler {
    async fn reconcile(&self, jenkins: &mut Jenkins) -> Result<KindOutcome, ReconcilerError> {
        validate(jenkins)?;

        let name = jenkins.name_any();
        let namespace = jenkins.namespace().unwrap_or_else(|| "default".to_string());
        let image = self.resolve_image(jenkins, &namespace).await?;

        if jenkins.spec.backup.enabled {
            if self.converger.create_if_absent(&backup_claim(jenkins)?).await? {
                info!("Created backup volume claim {}", jenkins.backup_claim_name());
            }
            if self
                .converger
                .create_if_absent(&default_backup_config(jenkins)?)
                .await?
            {
                info!("Created default BackupConfig for Jenkins {}", name);
            }
        }

        let mut ready = false;
        let deployment_name = jenkins.deployment_name();
        for manifest in self.synthesizer.synthesize(jenkins, &image)? {
            let live = self.converger.apply(&manifest).await?;
            let is_deployment = live.types.as_ref().is_some_and(|t| t.kind == "Deployment");
            if is_deployment && live.name_any() == deployment_name {
                ready = deployment_ready(&live);
            }
        }

        let status = jenkins.status.get_or_insert_with(Default::default);
        status.image = Some(image);
        if !ready {
            info!("⏳ Jenkins {}/{} is not ready yet", namespace, name);
            status.phase = Some(PHASE_INITIALIZING.to_string());
            return Ok(KindOutcome::Pending(self.readiness_requeue));
        }

        let applied = self.scripts.apply_all(jenkins).await?;
        if applied > 0 {
            info!("Applied {} groovy scripts to Jenkins {}", applied, name);
        }

        let generation = jenkins.metadata.generation;
        let status = jenkins.status.get_or_insert_with(Default::default);
        status.phase = Some(PHASE_READY.to_string());
        status.observed_generation = generation;
        info!("✅ Jenkins {}/{} is ready", namespace, name);
        Ok(KindOutcome::Converged)
    }

    fn failure_reason(&self, error: &ReconcilerError) -> ReasonKind {
        match error {
            ReconcilerError::Validation(_) => ReasonKind::BaseConfigurationFailed,
            _ => ReasonKind::ReconcileLoopFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::JenkinsSpec;

    #[test]
    fn test_default_spec_is_valid() {
        let jenkins = Jenkins::new("example", JenkinsSpec::default());
        assert!(validate(&jenkins).is_ok());
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let mut spec = JenkinsSpec::default();
        spec.image = Some("  ".to_string());
        spec.service.port = 0;
        let jenkins = Jenkins::new("Bad_Name", spec);

        match validate(&jenkins) {
            Err(ReconcilerError::Validation(problems)) => {
                assert_eq!(problems.len(), 3, "{problems:?}");
                assert!(problems[0].contains("Bad_Name"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_names_must_be_dns_labels() {
        let valid = "a".repeat(63);
        assert!(validate(&Jenkins::new(&valid, JenkinsSpec::default())).is_ok());

        for name in ["a".repeat(64), "jenkins-".to_string(), "-jenkins".to_string()] {
            let jenkins = Jenkins::new(&name, JenkinsSpec::default());
            assert!(
                matches!(validate(&jenkins), Err(ReconcilerError::Validation(_))),
                "{name}"
            );
        }

        let mut spec = JenkinsSpec::default();
        spec.jenkins_image_ref = Some("With.Dots".to_string());
        match validate(&Jenkins::new("example", spec)) {
            Err(ReconcilerError::Validation(problems)) => {
                assert_eq!(problems, vec!["jenkinsImageRef must be a valid resource name"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
