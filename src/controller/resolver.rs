//! # Reference Resolver
//!
//! Looks up the objects a resource points at: the BackupConfig of a
//! Backup, the Jenkins a BackupConfig targets, the pod running a Jenkins
//! master, and the ConfigMaps and Secrets referenced by a Jenkins spec.
//! A missing object is `Ok(None)`, never an error.

use crate::controller::error::ReconcilerError;
use crate::crd::{Backup, BackupConfig, Jenkins, JenkinsImage};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;

#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    async fn jenkins(&self, namespace: &str, name: &str) -> Result<Option<Jenkins>, ReconcilerError>;

    async fn backup(&self, namespace: &str, name: &str) -> Result<Option<Backup>, ReconcilerError>;

    async fn backup_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BackupConfig>, ReconcilerError>;

    async fn jenkins_image(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<JenkinsImage>, ReconcilerError>;

    /// Name of a running, non-terminating master pod of `jenkins`
    async fn jenkins_pod(&self, jenkins: &Jenkins) -> Result<Option<String>, ReconcilerError>;

    /// Phase of a pod, `None` when the pod does not exist
    async fn pod_phase(&self, namespace: &str, name: &str) -> Result<Option<String>, ReconcilerError>;

    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ReconcilerError>;

    /// Secret data decoded as UTF-8 strings
    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ReconcilerError>;
}

/// [`ReferenceResolver`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeResolver {
    client: Client,
}

impl std::fmt::Debug for KubeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResolver").finish_non_exhaustive()
    }
}

impl KubeResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReferenceResolver for KubeResolver {
    async fn jenkins(&self, namespace: &str, name: &str) -> Result<Option<Jenkins>, ReconcilerError> {
        let api: Api<Jenkins> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn backup(&self, namespace: &str, name: &str) -> Result<Option<Backup>, ReconcilerError> {
        let api: Api<Backup> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn backup_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BackupConfig>, ReconcilerError> {
        let api: Api<BackupConfig> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn jenkins_image(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<JenkinsImage>, ReconcilerError> {
        let api: Api<JenkinsImage> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn jenkins_pod(&self, jenkins: &Jenkins) -> Result<Option<String>, ReconcilerError> {
        let namespace = jenkins.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let pods = api
            .list(&ListParams::default().labels(&jenkins.pod_selector()))
            .await?;

        Ok(pods
            .items
            .into_iter()
            .find(|pod| {
                pod.metadata.deletion_timestamp.is_none()
                    && pod
                        .status
                        .as_ref()
                        .and_then(|s| s.phase.as_deref())
                        == Some("Running")
            })
            .map(|pod| pod.name_any()))
    }

    async fn pod_phase(&self, namespace: &str, name: &str) -> Result<Option<String>, ReconcilerError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get_opt(name)
            .await?
            .map(|pod| pod.status.and_then(|s| s.phase).unwrap_or_default()))
    }

    async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ReconcilerError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|cm| cm.data.unwrap_or_default()))
    }

    async fn secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ReconcilerError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?.map(|secret| {
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
                .collect()
        }))
    }
}
