//! # Initialization
//!
//! Operator initialization: rustls setup, tracing, metrics, server
//! startup, Kubernetes client setup and construction of every reconcile
//! component. This is the only place concrete implementations are chosen;
//! everything below receives its collaborators as `Arc`s.

use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::constants;
use crate::controller::converge::{KubeConverger, ResourceConverger};
use crate::controller::exec::{KubeExecutor, RemoteExecutor};
use crate::controller::reconciler::{
    BackupLayout, BackupReconciler, ImageReconciler, JenkinsReconciler, RestoreReconciler,
};
use crate::controller::resolver::{KubeResolver, ReferenceResolver};
use crate::controller::resources::DefaultSynthesizer;
use crate::controller::scripts::{HttpScriptTransport, ScriptRunner};
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::{KubeObjectStore, ObjectStore};
use crate::controller::{Engine, EngineSettings, FailureTracker, KindReconciler};
use crate::crd::{Backup, Conditioned, Jenkins, JenkinsImage, Restore};
use crate::notifications::listener::{listen, ChannelNotifier};
use crate::notifications::Notifier;
use crate::observability;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::runtime::events::{Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// One engine per reconciled kind
#[derive(Debug, Clone)]
pub struct Engines {
    pub jenkins: Arc<Engine<Jenkins>>,
    pub backup: Arc<Engine<Backup>>,
    pub restore: Arc<Engine<Restore>>,
    pub image: Arc<Engine<JenkinsImage>>,
}

/// Initialization result containing all necessary components for the operator
pub struct InitializationResult {
    pub client: Client,
    pub engines: Engines,
    pub controller_config: ControllerConfig,
    pub server_state: Arc<ServerState>,
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler and engine wiring
/// - The notification listener
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jenkins_operator=info".into()),
        )
        .init();

    info!("Starting Jenkins operator v{}", env!("CARGO_PKG_VERSION"));

    let (controller_config, server_config) = load_config();
    info!(
        "Configuration: fail limit {}, requeue delay {:?}, exec timeout {:?}",
        controller_config.reconcile_fail_limit,
        controller_config.requeue_delay(),
        controller_config.exec_timeout()
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let bind_address = server_config.bind_address();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(bind_address, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let (notifier, events) = ChannelNotifier::new();
    let reporter = Reporter {
        controller: constants::EVENT_REPORTER.to_string(),
        instance: std::env::var("POD_NAME").ok(),
    };
    tokio::spawn(listen(events, Recorder::new(client.clone(), reporter)));

    let engines = build_engines(client.clone(), &controller_config, Arc::new(notifier))?;

    check_crds_queryable(&client, controller_config.watch_namespace.as_deref()).await;

    info!("Operator initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        engines,
        controller_config,
        server_state,
    })
}

/// Wire the Kubernetes-backed collaborators into one engine per kind
pub fn build_engines(
    client: Client,
    config: &ControllerConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<Engines> {
    let resolver: Arc<dyn ReferenceResolver> = Arc::new(KubeResolver::new(client.clone()));
    let converger: Arc<dyn ResourceConverger> = Arc::new(KubeConverger::new(client.clone()));
    let executor: Arc<dyn RemoteExecutor> =
        Arc::new(KubeExecutor::new(client.clone(), config.exec_timeout()));
    let transport = HttpScriptTransport::new(Arc::clone(&resolver))
        .context("Failed to create Jenkins HTTP client")?;
    let layout = BackupLayout::from_config(config);

    let jenkins = JenkinsReconciler::new(
        Arc::clone(&resolver),
        Arc::clone(&converger),
        Arc::new(DefaultSynthesizer {
            jenkins_home: config.jenkins_home.clone(),
            backup_root: config.backup_root.clone(),
            backup_container: config.backup_container.clone(),
        }),
        ScriptRunner::new(Arc::new(transport), Arc::clone(&resolver)),
        config.default_jenkins_image.clone(),
        config.readiness_requeue(),
    );

    let backup_store: Arc<dyn ObjectStore<Backup>> =
        Arc::new(KubeObjectStore::<Backup>::new(client.clone()));
    let backup = BackupReconciler::new(
        Arc::clone(&backup_store),
        Arc::clone(&resolver),
        Arc::clone(&executor),
        Arc::clone(&notifier),
        layout.clone(),
    );

    let restore_store: Arc<dyn ObjectStore<Restore>> =
        Arc::new(KubeObjectStore::<Restore>::new(client.clone()));
    let restore = RestoreReconciler::new(
        Arc::clone(&restore_store),
        Arc::clone(&resolver),
        Arc::clone(&executor),
        Arc::clone(&notifier),
        layout,
    );

    let image_store: Arc<dyn ObjectStore<JenkinsImage>> =
        Arc::new(KubeObjectStore::<JenkinsImage>::new(client.clone()));
    let image = ImageReconciler::new(
        Arc::clone(&image_store),
        Arc::clone(&resolver),
        Arc::clone(&converger),
        Arc::clone(&notifier),
        config.image_builder_image.clone(),
        config.image_build_poll(),
    );

    Ok(Engines {
        jenkins: engine(
            "jenkins",
            Arc::new(KubeObjectStore::<Jenkins>::new(client)),
            Arc::new(jenkins),
            config,
            &notifier,
        ),
        backup: engine("backup", backup_store, Arc::new(backup), config, &notifier),
        restore: engine("restore", restore_store, Arc::new(restore), config, &notifier),
        image: engine("jenkinsimage", image_store, Arc::new(image), config, &notifier),
    })
}

fn engine<K>(
    kind: &'static str,
    store: Arc<dyn ObjectStore<K>>,
    reconciler: Arc<dyn KindReconciler<K>>,
    config: &ControllerConfig,
    notifier: &Arc<dyn Notifier>,
) -> Arc<Engine<K>>
where
    K: Resource<DynamicType = ()> + Conditioned + Clone + Send + Sync + 'static,
{
    Arc::new(Engine::new(
        EngineSettings {
            kind,
            requeue_delay: config.requeue_delay(),
        },
        store,
        reconciler,
        Arc::new(FailureTracker::new(config.reconcile_fail_limit)),
        Arc::clone(notifier),
    ))
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = config.startup_timeout;
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(config.poll_interval).await;
    }

    Ok(())
}

/// List every kind once and log a startup summary
///
/// A failing list usually means the CRDs are not installed. The operator
/// still starts; the controllers keep retrying.
async fn check_crds_queryable(client: &Client, namespace: Option<&str>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.check_crds",
        operation = "check_crds_queryable"
    );
    async {
        summarize::<Jenkins>(client, namespace, "Jenkins").await;
        summarize::<Backup>(client, namespace, "Backup").await;
        summarize::<Restore>(client, namespace, "Restore").await;
        summarize::<JenkinsImage>(client, namespace, "JenkinsImage").await;
    }
    .instrument(span)
    .await;
}

async fn summarize<K>(client: &Client, namespace: Option<&str>, kind: &str)
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned,
{
    let api: Api<K> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    match api.list(&ListParams::default()).await {
        Ok(list) => {
            let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for item in &list.items {
                by_namespace
                    .entry(item.namespace().unwrap_or_else(|| "default".to_string()))
                    .or_default()
                    .push(item.name_any());
            }
            info!(
                "Found {} existing {} resources in {} namespaces",
                list.items.len(),
                kind,
                by_namespace.len()
            );
            for (ns, mut names) in by_namespace {
                names.sort();
                info!("  {}: {}", ns, names.join(", "));
            }
        }
        Err(e) => {
            error!("{} CRD is not queryable: {}. Is the CRD installed?", kind, e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD check failure, the controller will retry");
        }
    }
}
