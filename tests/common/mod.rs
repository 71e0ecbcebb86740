//! # Test Fakes
//!
//! In-memory implementations of the platform seams used by the integration
//! tests, plus fixtures for the custom resources.

#![allow(dead_code, reason = "Each test binary uses a different subset of the fakes")]

use async_trait::async_trait;
use jenkins_operator::controller::converge::{ResourceConverger, Synthesizer};
use jenkins_operator::controller::engine::{Engine, EngineSettings, KindReconciler};
use jenkins_operator::controller::exec::{PodTarget, RemoteExecutor};
use jenkins_operator::controller::failure_tracker::FailureTracker;
use jenkins_operator::controller::resolver::ReferenceResolver;
use jenkins_operator::controller::scripts::ScriptTransport;
use jenkins_operator::controller::store::ObjectStore;
use jenkins_operator::controller::ReconcilerError;
use jenkins_operator::crd::{
    Backup, BackupConfig, BackupConfigSpec, BackupOptions, BackupSpec, Conditioned, Jenkins,
    JenkinsImage, JenkinsSpec, RestartPolicy, Restore, RestoreSpec,
};
use jenkins_operator::notifications::{Event, NotificationError, Notifier};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "ci";
pub const JENKINS_POD: &str = "jenkins-example-7d9f";

/// Kubernetes API error with the given HTTP code
pub fn api_error(code: u16) -> kube::Error {
    let reason = match code {
        404 => "NotFound",
        409 => "Conflict",
        _ => "InternalError",
    };
    kube::Error::Api(
        serde_json::from_value(json!({
            "metadata": {},
            "status": "Failure",
            "message": format!("simulated {reason}"),
            "reason": reason,
            "code": code,
        }))
        .expect("valid API error"),
    )
}

pub fn conflict_error() -> ReconcilerError {
    ReconcilerError::Kube(api_error(409))
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(format!("uid-{name}")),
        generation: Some(1),
        ..ObjectMeta::default()
    }
}

pub fn jenkins(name: &str) -> Jenkins {
    let mut jenkins = Jenkins::new(name, JenkinsSpec::default());
    jenkins.metadata = meta(name);
    jenkins
}

pub fn backup(name: &str) -> Backup {
    let mut backup = Backup::new(name, BackupSpec::default());
    backup.metadata = meta(name);
    backup
}

pub fn restore(name: &str, backup_ref: &str) -> Restore {
    let mut restore = Restore::new(
        name,
        RestoreSpec {
            backup_ref: backup_ref.to_string(),
        },
    );
    restore.metadata = meta(name);
    restore
}

pub fn backup_config(
    jenkins_ref: &str,
    quiet_down: bool,
    options: BackupOptions,
    restart: RestartPolicy,
) -> BackupConfig {
    let mut config = BackupConfig::new(
        "default",
        BackupConfigSpec {
            jenkins_ref: jenkins_ref.to_string(),
            quiet_down_during_backup: quiet_down,
            options,
            restart_after_restore: restart,
        },
    );
    config.metadata = meta("default");
    config
}

/// Object store holding objects in memory with resource-version checks
pub struct MemoryStore<K> {
    objects: Mutex<HashMap<String, K>>,
    pending_conflicts: AtomicUsize,
    pub status_writes: AtomicUsize,
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone,
{
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            pending_conflicts: AtomicUsize::new(0),
            status_writes: AtomicUsize::new(0),
        }
    }

    pub fn with(obj: K) -> Arc<Self> {
        let store = Self::new();
        store.insert(obj);
        Arc::new(store)
    }

    pub fn insert(&self, mut obj: K) {
        if obj.meta().resource_version.is_none() {
            obj.meta_mut().resource_version = Some("1".to_string());
        }
        let key = key_of(&obj);
        self.objects.lock().expect("lock").insert(key, obj);
    }

    pub fn current(&self, name: &str) -> K {
        self.objects
            .lock()
            .expect("lock")
            .get(&format!("{NAMESPACE}/{name}"))
            .cloned()
            .expect("object exists")
    }

    pub fn remove(&self, name: &str) {
        self.objects
            .lock()
            .expect("lock")
            .remove(&format!("{NAMESPACE}/{name}"));
    }

    /// Make the next `n` status writes fail with a conflict
    pub fn fail_next_writes_with_conflict(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

fn key_of<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or("default"),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Send + Sync,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ReconcilerError> {
        Ok(self
            .objects
            .lock()
            .expect("lock")
            .get(&format!("{namespace}/{name}"))
            .cloned())
    }

    async fn update_status(&self, obj: &K) -> Result<K, ReconcilerError> {
        let pending = self.pending_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(conflict_error());
        }

        let mut objects = self.objects.lock().expect("lock");
        let Some(stored) = objects.get_mut(&key_of(obj)) else {
            return Err(ReconcilerError::Kube(api_error(404)));
        };
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(conflict_error());
        }

        let version: u64 = stored
            .meta()
            .resource_version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut next = obj.clone();
        next.meta_mut().resource_version = Some((version + 1).to_string());
        *stored = next.clone();
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }
}

/// Records every command and fails those containing a configured fragment
#[derive(Default)]
pub struct RecordingExecutor {
    pub requests: Mutex<Vec<(String, String)>>,
    failing: Mutex<Vec<String>>,
    pub init_fails: AtomicBool,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, fragment: &str) {
        self.failing.lock().expect("lock").push(fragment.to_string());
    }

    pub fn request_names(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("lock")
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn init_session(&self) -> Result<(), ReconcilerError> {
        if self.init_fails.load(Ordering::SeqCst) {
            return Err(ReconcilerError::ControlApi("session unavailable".to_string()));
        }
        Ok(())
    }

    async fn make_request(
        &self,
        target: &PodTarget,
        request_name: &str,
        command: &str,
    ) -> Result<String, ReconcilerError> {
        self.requests
            .lock()
            .expect("lock")
            .push((request_name.to_string(), command.to_string()));
        let fails = self
            .failing
            .lock()
            .expect("lock")
            .iter()
            .any(|fragment| command.contains(fragment.as_str()));
        if fails {
            return Err(ReconcilerError::RemoteCommand {
                pod: target.to_string(),
                request: request_name.to_string(),
                message: "command terminated with exit code 1".to_string(),
            });
        }
        Ok(String::new())
    }
}

/// Resolver answering from in-memory maps keyed by name
#[derive(Default)]
pub struct FakeResolver {
    pub jenkins: Mutex<HashMap<String, Jenkins>>,
    pub backups: Mutex<HashMap<String, Backup>>,
    pub backup_configs: Mutex<HashMap<String, BackupConfig>>,
    pub images: Mutex<HashMap<String, JenkinsImage>>,
    pub pod: Mutex<Option<String>>,
    pub pod_phases: Mutex<HashMap<String, String>>,
    pub config_maps: Mutex<HashMap<String, BTreeMap<String, String>>>,
    pub secrets: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resolver with a Jenkins instance, its running pod and a BackupConfig
    pub fn with_target(config: BackupConfig) -> Arc<Self> {
        let resolver = Self::default();
        let jenkins = jenkins(&config.spec.jenkins_ref);
        resolver
            .jenkins
            .lock()
            .expect("lock")
            .insert(jenkins.name_any(), jenkins);
        resolver
            .backup_configs
            .lock()
            .expect("lock")
            .insert(config.name_any(), config);
        *resolver.pod.lock().expect("lock") = Some(JENKINS_POD.to_string());
        Arc::new(resolver)
    }

    pub fn add_backup(&self, backup: Backup) {
        self.backups
            .lock()
            .expect("lock")
            .insert(backup.name_any(), backup);
    }

    pub fn add_config_map(&self, name: &str, data: &[(&str, &str)]) {
        self.config_maps.lock().expect("lock").insert(
            name.to_string(),
            data.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
    }
}

#[async_trait]
impl ReferenceResolver for FakeResolver {
    async fn jenkins(&self, _namespace: &str, name: &str) -> Result<Option<Jenkins>, ReconcilerError> {
        Ok(self.jenkins.lock().expect("lock").get(name).cloned())
    }

    async fn backup(&self, _namespace: &str, name: &str) -> Result<Option<Backup>, ReconcilerError> {
        Ok(self.backups.lock().expect("lock").get(name).cloned())
    }

    async fn backup_config(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<BackupConfig>, ReconcilerError> {
        Ok(self.backup_configs.lock().expect("lock").get(name).cloned())
    }

    async fn jenkins_image(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<JenkinsImage>, ReconcilerError> {
        Ok(self.images.lock().expect("lock").get(name).cloned())
    }

    async fn jenkins_pod(&self, _jenkins: &Jenkins) -> Result<Option<String>, ReconcilerError> {
        Ok(self.pod.lock().expect("lock").clone())
    }

    async fn pod_phase(&self, _namespace: &str, name: &str) -> Result<Option<String>, ReconcilerError> {
        Ok(self.pod_phases.lock().expect("lock").get(name).cloned())
    }

    async fn config_map_data(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ReconcilerError> {
        Ok(self.config_maps.lock().expect("lock").get(name).cloned())
    }

    async fn secret_data(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ReconcilerError> {
        Ok(self.secrets.lock().expect("lock").get(name).cloned())
    }
}

/// Converger recording applied manifests; Deployments report readiness on demand
#[derive(Default)]
pub struct FakeConverger {
    pub applied: Mutex<Vec<DynamicObject>>,
    pub created: Mutex<Vec<String>>,
    pub deployment_ready: AtomicBool,
}

impl FakeConverger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn applied_kinds(&self) -> Vec<String> {
        self.applied
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|obj| obj.types.as_ref().map(|t| t.kind.clone()))
            .collect()
    }
}

#[async_trait]
impl ResourceConverger for FakeConverger {
    async fn apply(&self, manifest: &DynamicObject) -> Result<DynamicObject, ReconcilerError> {
        self.applied.lock().expect("lock").push(manifest.clone());
        let mut live = manifest.clone();
        let is_deployment = live.types.as_ref().is_some_and(|t| t.kind == "Deployment");
        if is_deployment {
            let ready = i64::from(self.deployment_ready.load(Ordering::SeqCst));
            live.data["status"] = json!({ "readyReplicas": ready });
        }
        Ok(live)
    }

    async fn create_if_absent(&self, manifest: &DynamicObject) -> Result<bool, ReconcilerError> {
        let kind = manifest.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        let key = format!("{}/{}", kind, manifest.name_any());
        let mut created = self.created.lock().expect("lock");
        if created.contains(&key) {
            return Ok(false);
        }
        created.push(key);
        Ok(true)
    }
}

/// Collects every notification sent
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("lock")
            .iter()
            .map(|e| e.reason.kind.as_str().to_string())
            .collect()
    }

    pub fn short_messages(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("lock")
            .iter()
            .map(|e| e.reason.short_message())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, event: Event) -> Result<(), NotificationError> {
        self.events.lock().expect("lock").push(event);
        Ok(())
    }
}

/// Script console that echoes the verifier line, or fails scripts containing `fail_marker`
#[derive(Default)]
pub struct EchoTransport {
    pub scripts: Mutex<Vec<String>>,
    pub fail_marker: Option<String>,
}

#[async_trait]
impl ScriptTransport for EchoTransport {
    async fn run_script(&self, _jenkins: &Jenkins, script: &str) -> Result<String, ReconcilerError> {
        self.scripts.lock().expect("lock").push(script.to_string());
        if self
            .fail_marker
            .as_deref()
            .is_some_and(|marker| script.contains(marker))
        {
            return Ok("groovy.lang.MissingPropertyException".to_string());
        }
        let verifier = script
            .rsplit("println('")
            .next()
            .and_then(|s| s.strip_suffix("')"))
            .unwrap_or_default();
        Ok(format!("{verifier}\n"))
    }
}

/// Synthesizer rendering only a Deployment with the requested image
pub struct StubSynthesizer;

impl Synthesizer for StubSynthesizer {
    fn synthesize(
        &self,
        jenkins: &Jenkins,
        image: &str,
    ) -> Result<Vec<DynamicObject>, ReconcilerError> {
        Ok(vec![serde_json::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": jenkins.deployment_name(), "namespace": NAMESPACE },
            "spec": {
                "replicas": 1,
                "template": { "spec": { "containers": [{ "name": "jenkins-master", "image": image }] } },
            },
        }))?])
    }
}

pub fn engine<K>(
    kind: &'static str,
    store: Arc<dyn ObjectStore<K>>,
    reconciler: Arc<dyn KindReconciler<K>>,
    notifier: Arc<dyn Notifier>,
    limit: u32,
) -> Engine<K>
where
    K: Conditioned + Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    Engine::new(
        EngineSettings {
            kind,
            requeue_delay: Duration::from_secs(5),
        },
        store,
        reconciler,
        Arc::new(FailureTracker::new(limit)),
        notifier,
    )
}
