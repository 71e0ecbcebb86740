//! # Watch Loop
//!
//! Runs one `kube` controller per kind. Each controller deduplicates
//! queued keys and never reconciles the same object on two workers at
//! once; the watchers relist periodically so delivery is level-triggered.

use crate::config::ControllerConfig;
use crate::controller::server::ServerState;
use crate::controller::{Engine, ReconcilerError};
use crate::crd::{Backup, Conditioned, Jenkins, JenkinsImage, Restore};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::initialization::Engines;
use anyhow::Result;
use futures::StreamExt;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{self, Action, Controller};
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Run the controllers of every kind until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    engines: Engines,
    config: &ControllerConfig,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let concurrency = config.worker_concurrency;
    let namespace = config.watch_namespace.as_deref();
    match namespace {
        Some(ns) => info!("Watching namespace {} with {} workers per kind", ns, concurrency),
        None => info!("Watching all namespaces with {} workers per kind", concurrency),
    }

    tokio::join!(
        run_controller(api::<Jenkins>(&client, namespace), engines.jenkins, concurrency),
        run_controller(api::<Backup>(&client, namespace), engines.backup, concurrency),
        run_controller(api::<Restore>(&client, namespace), engines.restore, concurrency),
        run_controller(api::<JenkinsImage>(&client, namespace), engines.image, concurrency),
    );

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("All controllers stopped");
    Ok(())
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn run_controller<K>(api: Api<K>, engine: Arc<Engine<K>>, concurrency: u16)
where
    K: Resource<DynamicType = ()>
        + Conditioned
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    let kind = engine.kind();
    info!("Starting {} controller", kind);

    Controller::new(api, watcher::Config::default().any_semantic())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, engine)
        .for_each(|result| async move {
            match result {
                Ok((obj_ref, action)) => {
                    debug!("{} {} reconciled, next action: {:?}", kind, obj_ref.name, action);
                }
                Err(e) => handle_watch_stream_error(kind, &e),
            }
        })
        .await;

    info!("{} controller stopped", kind);
}

/// Entry point the controller calls for every queued object
pub async fn reconcile<K>(obj: Arc<K>, engine: Arc<Engine<K>>) -> Result<Action, ReconcilerError>
where
    K: Resource<DynamicType = ()> + Conditioned + Clone + Send + Sync + 'static,
{
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let outcome = engine.reconcile(&namespace, &name).await?;
    debug!("{} {}/{} outcome: {:?}", engine.kind(), namespace, name, outcome);
    Ok(outcome.into_action())
}
