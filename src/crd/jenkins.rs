//! # Jenkins
//!
//! The managed Jenkins instance and the scripts applied to it.

use super::condition::{impl_conditioned, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Jenkins Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: jenkins.io/v1alpha2
/// kind: Jenkins
/// metadata:
///   name: example
///   namespace: ci
/// spec:
///   image: jenkins/jenkins:lts
///   backup:
///     enabled: true
///   groovyScripts:
///     configurations:
///       - name: jenkins-init-scripts
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Jenkins",
    group = "jenkins.io",
    version = "v1alpha2",
    namespaced,
    status = "JenkinsStatus",
    shortname = "jenkins",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Image", "type":"string", "jsonPath":".status.image"}, {"name":"Available", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsSpec {
    /// Container image for the Jenkins master
    #[serde(default)]
    pub image: Option<String>,
    /// Name of a JenkinsImage in the same namespace whose latest build is used as image
    #[serde(default)]
    pub jenkins_image_ref: Option<String>,
    /// HTTP service exposing the Jenkins UI and API
    #[serde(default)]
    pub service: ServiceSpec,
    /// Backup volume and sidecar settings
    #[serde(default)]
    pub backup: BackupSettings,
    /// Groovy scripts applied through the script console once Jenkins is ready
    #[serde(default)]
    pub groovy_scripts: Option<GroovyScripts>,
    /// Secret holding `user` and `token` keys for the Jenkins HTTP API
    #[serde(default)]
    pub api_credentials_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default = "default_service_type")]
    pub r#type: String,
    #[serde(default = "default_http_port")]
    pub port: i32,
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            r#type: default_service_type(),
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Size of the backup volume claim
    #[serde(default = "default_backup_volume_size")]
    pub volume_size: String,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            volume_size: default_backup_volume_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroovyScripts {
    /// ConfigMaps whose entries are groovy scripts, applied in key order
    #[serde(default)]
    pub configurations: Vec<ConfigMapRef>,
    /// Secret whose data is folded into each script hash
    #[serde(default)]
    pub secret: Option<SecretRef>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ConfigMapRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct SecretRef {
    pub name: String,
}

/// A script already applied to a Jenkins instance
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedScript {
    pub configuration_type: String,
    /// ConfigMap the script came from
    pub source: String,
    /// Key of the script within its source
    pub name: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Values: Initializing, Ready
    #[serde(default)]
    pub phase: Option<String>,
    /// Image the master container currently runs
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub applied_groovy_scripts: Vec<AppliedScript>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl_conditioned!(Jenkins);

/// Capability of resources that track which scripts were applied to them
pub trait AppliedScripts {
    fn applied_scripts(&self) -> &[AppliedScript];
    fn set_applied_scripts(&mut self, scripts: Vec<AppliedScript>);
}

impl AppliedScripts for Jenkins {
    fn applied_scripts(&self) -> &[AppliedScript] {
        self.status
            .as_ref()
            .map(|s| s.applied_groovy_scripts.as_slice())
            .unwrap_or_default()
    }

    fn set_applied_scripts(&mut self, scripts: Vec<AppliedScript>) {
        self.status
            .get_or_insert_with(Default::default)
            .applied_groovy_scripts = scripts;
    }
}

impl Jenkins {
    /// Name of the Deployment running the Jenkins master
    pub fn deployment_name(&self) -> String {
        format!("jenkins-{}", self.metadata.name.as_deref().unwrap_or_default())
    }

    /// Name of the HTTP Service in front of the master
    pub fn service_name(&self) -> String {
        format!("jenkins-{}-http", self.metadata.name.as_deref().unwrap_or_default())
    }

    /// Name of the backup volume claim
    pub fn backup_claim_name(&self) -> String {
        format!("{}-jenkins-backup", self.metadata.name.as_deref().unwrap_or_default())
    }

    /// Label selector matching the master pods
    pub fn pod_selector(&self) -> String {
        format!(
            "app=jenkins-operator,jenkins-cr={}",
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}

fn default_service_type() -> String {
    "ClusterIP".to_string()
}

fn default_http_port() -> i32 {
    crate::constants::DEFAULT_JENKINS_HTTP_PORT
}

fn default_backup_volume_size() -> String {
    crate::constants::DEFAULT_BACKUP_VOLUME_SIZE.to_string()
}
