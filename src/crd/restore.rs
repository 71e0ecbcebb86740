//! # Restore
//!
//! One-shot restore requests. A Restore copies the data of a Backup back
//! into the Jenkins home directory of the instance the backup came from.

use super::condition::{impl_conditioned, Condition};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Restore",
    group = "jenkins.io",
    version = "v1alpha2",
    namespaced,
    status = "RestoreStatus",
    printcolumn = r#"{"name":"Backup", "type":"string", "jsonPath":".spec.backupRef"}, {"name":"Completed", "type":"string", "jsonPath":".status.conditions[?(@.type==\"RestoreCompleted\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Backup in the same namespace to restore from
    pub backup_ref: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RestoreStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl_conditioned!(Restore);
