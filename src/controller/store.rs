//! # Object Store
//!
//! Read an object and write back its status subresource. The engine and
//! the pipeline executor only talk to the platform through this trait.

use crate::constants::FIELD_MANAGER;
use crate::controller::error::ReconcilerError;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Fetch the latest version of an object, `None` when it no longer exists
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ReconcilerError>;

    /// Persist the status of `obj` and return the stored object
    ///
    /// Fails with a conflict when `obj` is not the latest version.
    async fn update_status(&self, obj: &K) -> Result<K, ReconcilerError>;
}

/// [`ObjectStore`] backed by the Kubernetes API
pub struct KubeObjectStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeObjectStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> std::fmt::Debug for KubeObjectStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeObjectStore<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ReconcilerError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_status(&self, obj: &K) -> Result<K, ReconcilerError> {
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let name = obj.name_any();
        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);

        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        // resourceVersion turns the merge patch into an optimistic-concurrency write
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": status,
        });

        debug!("Patching status of {}/{}", namespace, name);
        let updated = api
            .patch_status(
                &name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }
}
