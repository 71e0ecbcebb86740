//! # Resource Converger
//!
//! Makes native platform resources match their desired manifests.
//! Manifests are untyped [`DynamicObject`]s so one converger serves
//! Deployments, Services, ConfigMaps, Pods and the operator's own kinds.

use crate::constants::FIELD_MANAGER;
use crate::controller::error::ReconcilerError;
use crate::crd::Jenkins;
use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

/// Ordered set of manifests rendered for one Jenkins instance
pub type NativeResourceSet = Vec<DynamicObject>;

/// Renders the native resources a Jenkins spec needs
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, jenkins: &Jenkins, image: &str) -> Result<NativeResourceSet, ReconcilerError>;
}

#[async_trait]
pub trait ResourceConverger: Send + Sync {
    /// Create or update `manifest` so the fields it sets match, returning the live object
    async fn apply(&self, manifest: &DynamicObject) -> Result<DynamicObject, ReconcilerError>;

    /// Create `manifest` only when no object of that name exists
    ///
    /// Returns true when the object was created.
    async fn create_if_absent(&self, manifest: &DynamicObject) -> Result<bool, ReconcilerError>;
}

/// [`ResourceConverger`] using server-side apply
#[derive(Clone)]
pub struct KubeConverger {
    client: Client,
}

impl std::fmt::Debug for KubeConverger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeConverger").finish_non_exhaustive()
    }
}

impl KubeConverger {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api_for(&self, manifest: &DynamicObject) -> Result<(Api<DynamicObject>, String), ReconcilerError> {
        let types = manifest.types.as_ref().ok_or_else(|| {
            ReconcilerError::ReconciliationFailed(anyhow::anyhow!(
                "manifest {} has no apiVersion/kind",
                manifest.name_any()
            ))
        })?;
        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", types.api_version.as_str()),
        };
        let resource = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &types.kind));
        let namespace = manifest.namespace().unwrap_or_else(|| "default".to_string());
        Ok((
            Api::namespaced_with(self.client.clone(), &namespace, &resource),
            types.kind.clone(),
        ))
    }
}

#[async_trait]
impl ResourceConverger for KubeConverger {
    async fn apply(&self, manifest: &DynamicObject) -> Result<DynamicObject, ReconcilerError> {
        let (api, kind) = self.api_for(manifest)?;
        let name = manifest.name_any();
        debug!("Applying {} {}", kind, name);
        let live = api
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(manifest),
            )
            .await?;
        Ok(live)
    }

    async fn create_if_absent(&self, manifest: &DynamicObject) -> Result<bool, ReconcilerError> {
        let (api, kind) = self.api_for(manifest)?;
        let name = manifest.name_any();
        if api.get_opt(&name).await?.is_some() {
            return Ok(false);
        }
        match api.create(&PostParams::default(), manifest).await {
            Ok(_) => {
                info!("Created {} {}", kind, name);
                Ok(true)
            }
            // Lost a race with another writer, the object exists now
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether a live Deployment reports all desired replicas ready
pub fn deployment_ready(deployment: &DynamicObject) -> bool {
    let desired = deployment
        .data
        .pointer("/spec/replicas")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(1);
    let ready = deployment
        .data
        .pointer("/status/readyReplicas")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    ready >= desired
}

/// Build a [`DynamicObject`] from a JSON manifest
pub fn manifest(value: serde_json::Value) -> Result<DynamicObject, ReconcilerError> {
    Ok(serde_json::from_value(value)?)
}
