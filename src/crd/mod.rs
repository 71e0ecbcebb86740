//! # Custom Resource Definitions
//!
//! CRD types for the Jenkins operator.
//!
//! All kinds live in the `jenkins.io/v1alpha2` API group. `Jenkins` is
//! reconciled continuously; `Backup`, `Restore` and `JenkinsImage` are
//! one-shot requests processed to completion once. `BackupConfig` carries
//! no status and is only read.

pub mod backup;
pub mod condition;
pub mod image;
pub mod jenkins;
pub mod restore;

pub use backup::*;
pub use condition::{
    find_condition, has_condition, set_condition, Condition,
    ConditionStatus, Conditioned,
};
pub use image::*;
pub use jenkins::*;
pub use restore::*;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// All CRDs served by the operator, in install order
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Jenkins::crd(),
        BackupConfig::crd(),
        Backup::crd(),
        Restore::crd(),
        JenkinsImage::crd(),
    ]
}
