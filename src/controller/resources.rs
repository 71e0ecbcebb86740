//! # Native Resources
//!
//! Manifests rendered for Jenkins instances and image builds.
//!
//! The master runs in a Deployment with a `backup` sidecar sharing the
//! Jenkins home volume. A `backup-init` container writes the helper
//! scripts used for quiet-down and restarts; backup volume claims are
//! mounted only when backups are enabled.

use crate::constants::{
    CANCEL_QUIET_DOWN_SCRIPT, DEFAULT_BACKUP_CONFIG_NAME, QUIET_DOWN_SCRIPT, RESTART_SCRIPT,
    SAFE_RESTART_SCRIPT, SCRIPTS_VOLUME_PATH,
};
use crate::controller::converge::{manifest, NativeResourceSet, Synthesizer};
use crate::controller::error::ReconcilerError;
use crate::crd::{Jenkins, JenkinsImage};
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use serde_json::{json, Value};

/// Renders a Deployment and HTTP Service per Jenkins instance
#[derive(Debug, Clone)]
pub struct DefaultSynthesizer {
    pub jenkins_home: String,
    pub backup_root: String,
    pub backup_container: String,
}

impl Synthesizer for DefaultSynthesizer {
    fn synthesize(&self, jenkins: &Jenkins, image: &str) -> Result<NativeResourceSet, ReconcilerError> {
        Ok(vec![self.deployment(jenkins, image)?, service(jenkins)?])
    }
}

impl DefaultSynthesizer {
    fn deployment(&self, jenkins: &Jenkins, image: &str) -> Result<DynamicObject, ReconcilerError> {
        let labels = pod_labels(jenkins);
        let port = jenkins.spec.service.port;

        let mut volumes = vec![
            json!({ "name": "jenkins-home", "emptyDir": {} }),
            json!({ "name": "helper-scripts", "emptyDir": {} }),
        ];
        let mut sidecar_mounts = vec![
            json!({ "name": "jenkins-home", "mountPath": self.jenkins_home }),
            json!({ "name": "helper-scripts", "mountPath": SCRIPTS_VOLUME_PATH }),
        ];
        if jenkins.spec.backup.enabled {
            volumes.push(json!({
                "name": "backup-pool",
                "persistentVolumeClaim": { "claimName": jenkins.backup_claim_name() },
            }));
            sidecar_mounts.push(json!({ "name": "backup-pool", "mountPath": self.backup_root }));
        }

        let credentials_env = jenkins
            .spec
            .api_credentials_secret
            .as_ref()
            .map(|secret| {
                json!([
                    { "name": "USER", "valueFrom": { "secretKeyRef": { "name": secret, "key": "user" } } },
                    { "name": "APITOKEN", "valueFrom": { "secretKeyRef": { "name": secret, "key": "token" } } },
                ])
            })
            .unwrap_or_else(|| json!([]));

        manifest(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": object_meta(jenkins, &jenkins.deployment_name())?,
            "spec": {
                "replicas": 1,
                "strategy": { "type": "Recreate" },
                "selector": { "matchLabels": labels },
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "initContainers": [{
                            "name": "backup-init",
                            "image": image,
                            "command": ["bash", "-c", helper_scripts()],
                            "volumeMounts": [{ "name": "helper-scripts", "mountPath": SCRIPTS_VOLUME_PATH }],
                        }],
                        "containers": [
                            {
                                "name": "jenkins-master",
                                "image": image,
                                "ports": [{ "name": "http", "containerPort": port }],
                                "env": [{ "name": "JENKINS_HOME", "value": self.jenkins_home }],
                                "readinessProbe": {
                                    "httpGet": { "path": "/login", "port": port },
                                    "initialDelaySeconds": 30,
                                    "periodSeconds": 10,
                                },
                                "volumeMounts": [{ "name": "jenkins-home", "mountPath": self.jenkins_home }],
                            },
                            {
                                "name": self.backup_container,
                                "image": image,
                                "command": ["sleep", "infinity"],
                                "env": credentials_env,
                                "volumeMounts": sidecar_mounts,
                            },
                        ],
                        "volumes": volumes,
                    },
                },
            },
        }))
    }
}

fn service(jenkins: &Jenkins) -> Result<DynamicObject, ReconcilerError> {
    manifest(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": object_meta(jenkins, &jenkins.service_name())?,
        "spec": {
            "type": jenkins.spec.service.r#type,
            "selector": pod_labels(jenkins),
            "ports": [{ "name": "http", "port": jenkins.spec.service.port, "targetPort": "http" }],
        },
    }))
}

/// Volume claim for the backup pool
pub fn backup_claim(jenkins: &Jenkins) -> Result<DynamicObject, ReconcilerError> {
    manifest(json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": object_meta(jenkins, &jenkins.backup_claim_name())?,
        "spec": {
            "accessModes": ["ReadWriteOnce"],
            "resources": { "requests": { "storage": jenkins.spec.backup.volume_size } },
        },
    }))
}

/// BackupConfig created for instances with backups enabled
pub fn default_backup_config(jenkins: &Jenkins) -> Result<DynamicObject, ReconcilerError> {
    manifest(json!({
        "apiVersion": "jenkins.io/v1alpha2",
        "kind": "BackupConfig",
        "metadata": {
            "name": DEFAULT_BACKUP_CONFIG_NAME,
            "namespace": jenkins.namespace(),
        },
        "spec": {
            "jenkinsRef": jenkins.name_any(),
            "quietDownDuringBackup": false,
            "options": { "config": true, "jobs": true, "plugins": true },
            "restartAfterRestore": { "enabled": true, "safe": false },
        },
    }))
}

/// Dockerfile installing the requested plugins on top of the base image
pub fn dockerfile(image: &JenkinsImage) -> String {
    let mut dockerfile = format!("FROM {}\n", image.spec.from.reference());
    if let Some(update_center) = &image.spec.default_update_center {
        dockerfile.push_str(&format!("ENV JENKINS_UC={update_center}\n"));
    }
    if !image.spec.plugins.is_empty() {
        let plugins: Vec<String> = image.spec.plugins.iter().map(|p| p.spec_string()).collect();
        dockerfile.push_str(&format!("RUN jenkins-plugin-cli --plugins {}\n", plugins.join(" ")));
    }
    dockerfile
}

pub fn dockerfile_config_map_name(image: &JenkinsImage) -> String {
    format!("{}-dockerfile", image.name_any())
}

pub fn builder_pod_name(image: &JenkinsImage) -> String {
    format!("{}-builder", image.name_any())
}

pub fn dockerfile_config_map(image: &JenkinsImage) -> Result<DynamicObject, ReconcilerError> {
    manifest(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": object_meta(image, &dockerfile_config_map_name(image))?,
        "data": { "Dockerfile": dockerfile(image) },
    }))
}

/// Pod running the image builder against the Dockerfile ConfigMap
pub fn builder_pod(image: &JenkinsImage, builder_image: &str) -> Result<DynamicObject, ReconcilerError> {
    let mut volumes = vec![json!({
        "name": "dockerfile",
        "configMap": { "name": dockerfile_config_map_name(image) },
    })];
    let mut mounts = vec![json!({ "name": "dockerfile", "mountPath": "/workspace" })];
    if let Some(secret) = &image.spec.to.secret {
        volumes.push(json!({
            "name": "docker-config",
            "secret": { "secretName": secret, "items": [{ "key": ".dockerconfigjson", "path": "config.json" }] },
        }));
        mounts.push(json!({ "name": "docker-config", "mountPath": "/kaniko/.docker" }));
    }

    manifest(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": object_meta(image, &builder_pod_name(image))?,
        "spec": {
            "restartPolicy": "Never",
            "containers": [{
                "name": "builder",
                "image": builder_image,
                "args": [
                    "--dockerfile=/workspace/Dockerfile",
                    "--context=dir:///workspace",
                    format!("--destination={}", image.spec.to.reference()),
                ],
                "volumeMounts": mounts,
            }],
            "volumes": volumes,
        },
    }))
}

fn pod_labels(jenkins: &Jenkins) -> Value {
    json!({ "app": "jenkins-operator", "jenkins-cr": jenkins.name_any() })
}

/// Metadata for an object owned by `owner`
fn object_meta<K>(owner: &K, name: &str) -> Result<Value, ReconcilerError>
where
    K: Resource<DynamicType = ()>,
{
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
            "{} has no uid yet, cannot own {}",
            owner.meta().name.as_deref().unwrap_or_default(),
            name
        ))
    })?;
    Ok(json!({
        "name": name,
        "namespace": owner.meta().namespace,
        "labels": { "app.kubernetes.io/managed-by": "jenkins-operator" },
        "ownerReferences": [owner_ref],
    }))
}

/// Shell script writing the quiet-down and restart helpers
fn helper_scripts() -> String {
    [
        (QUIET_DOWN_SCRIPT, "quietDown"),
        (CANCEL_QUIET_DOWN_SCRIPT, "cancelQuietDown"),
        (RESTART_SCRIPT, "restart"),
        (SAFE_RESTART_SCRIPT, "safeRestart"),
    ]
    .iter()
    .map(|(path, action)| {
        format!(
            "cat > {path} << '{action}heredoc'\n\
             SERVER=http://localhost:8080\n\
             CRUMB=$(curl -s --user $USER:$APITOKEN \"$SERVER/crumbIssuer/api/xml?xpath=concat(//crumbRequestField,%22:%22,//crumb)\")\n\
             curl -s -f -X POST --user $USER:$APITOKEN -H \"$CRUMB\" $SERVER/{action}\n\
             {action}heredoc\n"
        )
    })
    .collect()
}
