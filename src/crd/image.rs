//! # JenkinsImage
//!
//! Requests to build a Jenkins image with a set of plugins baked in.

use super::condition::{impl_conditioned, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const PHASE_BUILD_PENDING: &str = "ImageBuildPending";
pub const PHASE_BUILD_SUCCESSFUL: &str = "ImageBuildSuccessful";
pub const PHASE_BUILD_FAILED: &str = "ImageBuildFailed";

/// JenkinsImage Custom Resource Definition
///
/// ```yaml
/// apiVersion: jenkins.io/v1alpha2
/// kind: JenkinsImage
/// metadata:
///   name: jenkins-with-git
/// spec:
///   from:
///     name: jenkins/jenkins
///     tag: lts
///   to:
///     registry: registry.example.com
///     name: ci/jenkins
///     tag: "1.0"
///   plugins:
///     - name: git
///       version: "5.2.1"
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "JenkinsImage",
    group = "jenkins.io",
    version = "v1alpha2",
    namespaced,
    status = "JenkinsImageStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsImageSpec {
    /// Base image
    pub from: ImageRef,
    /// Destination the built image is pushed to
    pub to: ImageRef,
    #[serde(default)]
    pub plugins: Vec<JenkinsPlugin>,
    /// Update center used by the plugin installer
    #[serde(default)]
    pub default_update_center: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub name: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub registry: Option<String>,
    /// Docker config secret used to push or pull
    #[serde(default)]
    pub secret: Option<String>,
}

impl ImageRef {
    /// Fully qualified `[registry/]name:tag`
    pub fn reference(&self) -> String {
        match &self.registry {
            Some(registry) if !registry.is_empty() => {
                format!("{}/{}:{}", registry.trim_end_matches('/'), self.name, self.tag)
            }
            _ => format!("{}:{}", self.name, self.tag),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct JenkinsPlugin {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl JenkinsPlugin {
    /// `name:version` as understood by the plugin installer
    pub fn spec_string(&self) -> String {
        match &self.version {
            Some(v) if !v.is_empty() => format!("{}:{}", self.name, v),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuild {
    pub image: String,
    /// md5 of the Dockerfile the image was built from
    pub md5sum: String,
    #[serde(default)]
    pub installed_plugins: Vec<JenkinsPlugin>,
    #[serde(default)]
    pub built_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JenkinsImageStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Values: ImageBuildPending, ImageBuildSuccessful, ImageBuildFailed
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub builds: Vec<ImageBuild>,
}

impl_conditioned!(JenkinsImage);

impl JenkinsImage {
    /// Image of the most recent successful build
    pub fn latest_image(&self) -> Option<&str> {
        let status = self.status.as_ref()?;
        if status.phase.as_deref() != Some(PHASE_BUILD_SUCCESSFUL) {
            return None;
        }
        status.builds.last().map(|b| b.image.as_str())
    }
}

fn default_tag() -> String {
    "latest".to_string()
}
