//! # Groovy Scripts
//!
//! Runs groovy scripts through the Jenkins script console and tracks which
//! ones were already applied.
//!
//! The script console can answer 200 even when a script blew up halfway,
//! so every submitted script gets a random verifier line appended. Output
//! without the verifier means the script did not finish.

use crate::controller::error::{ReconcilerError, ScriptExecutionFailed};
use crate::controller::resolver::ReferenceResolver;
use crate::crd::{AppliedScript, AppliedScripts, Jenkins};
use async_trait::async_trait;
use base64::Engine as _;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Configuration type recorded for user supplied groovy scripts
pub const USER_GROOVY_SCRIPTS: &str = "user-groovy-scripts";

/// Raw access to the Jenkins script console
#[async_trait]
pub trait ScriptTransport: Send + Sync {
    /// Submit `script` and return whatever the console printed
    async fn run_script(&self, jenkins: &Jenkins, script: &str) -> Result<String, ReconcilerError>;
}

/// Identifies a script for error reporting and applied-script tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub configuration_type: String,
    pub source: String,
    pub name: String,
}

/// Run `script` and confirm it completed by looking for a verifier token in its output
pub async fn execute_script(
    transport: &dyn ScriptTransport,
    jenkins: &Jenkins,
    origin: &ScriptSource,
    script: &str,
) -> Result<String, ReconcilerError> {
    let verifier = format!("verifier-{}", uuid::Uuid::new_v4().simple());
    let submitted = format!("{script}\nprint println('{verifier}')");

    let output = transport.run_script(jenkins, &submitted).await?;
    if !output.contains(&verifier) {
        return Err(ScriptExecutionFailed {
            configuration_type: origin.configuration_type.clone(),
            script_source: origin.source.clone(),
            name: origin.name.clone(),
            logs: output,
        }
        .into());
    }
    Ok(output.replace(&verifier, "").trim_end().to_string())
}

/// Hash of a script together with the secret data it can read
pub fn script_hash(secret_data: &BTreeMap<String, String>, name: &str, script: &str) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in secret_data {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.update(name.as_bytes());
    hasher.update(script.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

pub fn is_applied(target: &impl AppliedScripts, origin: &ScriptSource, hash: &str) -> bool {
    target.applied_scripts().iter().any(|applied| {
        applied.configuration_type == origin.configuration_type
            && applied.source == origin.source
            && applied.name == origin.name
            && applied.hash == hash
    })
}

/// Record `origin` as applied with `hash`, replacing an older hash of the same script
pub fn mark_applied(target: &mut impl AppliedScripts, origin: &ScriptSource, hash: &str) {
    let mut scripts: Vec<AppliedScript> = target
        .applied_scripts()
        .iter()
        .filter(|applied| {
            !(applied.configuration_type == origin.configuration_type
                && applied.source == origin.source
                && applied.name == origin.name)
        })
        .cloned()
        .collect();
    scripts.push(AppliedScript {
        configuration_type: origin.configuration_type.clone(),
        source: origin.source.clone(),
        name: origin.name.clone(),
        hash: hash.to_string(),
    });
    target.set_applied_scripts(scripts);
}

/// Applies the groovy scripts referenced by a Jenkins spec
pub struct ScriptRunner {
    transport: Arc<dyn ScriptTransport>,
    resolver: Arc<dyn ReferenceResolver>,
}

impl std::fmt::Debug for ScriptRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRunner").finish_non_exhaustive()
    }
}

impl ScriptRunner {
    pub fn new(transport: Arc<dyn ScriptTransport>, resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self { transport, resolver }
    }

    /// Run every script not applied yet, in ConfigMap then key order
    ///
    /// Returns the number of scripts executed. Stops at the first failure;
    /// scripts applied before it stay recorded on `jenkins`.
    pub async fn apply_all(&self, jenkins: &mut Jenkins) -> Result<usize, ReconcilerError> {
        let Some(groovy) = jenkins.spec.groovy_scripts.clone() else {
            return Ok(0);
        };
        let namespace = jenkins.namespace().unwrap_or_else(|| "default".to_string());

        let secret_data = match &groovy.secret {
            Some(secret) => self
                .resolver
                .secret_data(&namespace, &secret.name)
                .await?
                .unwrap_or_default(),
            None => BTreeMap::new(),
        };

        let mut executed = 0;
        for config_map in &groovy.configurations {
            let Some(scripts) = self
                .resolver
                .config_map_data(&namespace, &config_map.name)
                .await?
            else {
                debug!("ConfigMap {}/{} not found, skipping", namespace, config_map.name);
                continue;
            };

            for (name, script) in &scripts {
                let origin = ScriptSource {
                    configuration_type: USER_GROOVY_SCRIPTS.to_string(),
                    source: config_map.name.clone(),
                    name: name.clone(),
                };
                let hash = script_hash(&secret_data, name, script);
                if is_applied(&*jenkins, &origin, &hash) {
                    continue;
                }

                info!("Applying groovy script {}/{}", origin.source, origin.name);
                execute_script(self.transport.as_ref(), jenkins, &origin, script).await?;
                mark_applied(jenkins, &origin, &hash);
                executed += 1;
            }
        }
        Ok(executed)
    }
}

/// [`ScriptTransport`] posting to `/scriptText` on the Jenkins HTTP service
pub struct HttpScriptTransport {
    http: reqwest::Client,
    resolver: Arc<dyn ReferenceResolver>,
}

impl std::fmt::Debug for HttpScriptTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpScriptTransport").finish_non_exhaustive()
    }
}

impl HttpScriptTransport {
    pub fn new(resolver: Arc<dyn ReferenceResolver>) -> Result<Self, ReconcilerError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| ReconcilerError::ControlApi(e.to_string()))?;
        Ok(Self { http, resolver })
    }

    fn base_url(jenkins: &Jenkins) -> String {
        format!(
            "http://{}.{}.svc:{}",
            jenkins.service_name(),
            jenkins.namespace().unwrap_or_else(|| "default".to_string()),
            jenkins.spec.service.port
        )
    }
}

#[async_trait]
impl ScriptTransport for HttpScriptTransport {
    async fn run_script(&self, jenkins: &Jenkins, script: &str) -> Result<String, ReconcilerError> {
        let url = format!("{}/scriptText", Self::base_url(jenkins));
        let mut request = self.http.post(&url).form(&[("script", script)]);

        if let Some(secret) = &jenkins.spec.api_credentials_secret {
            let namespace = jenkins.namespace().unwrap_or_else(|| "default".to_string());
            let credentials = self
                .resolver
                .secret_data(&namespace, secret)
                .await?
                .unwrap_or_default();
            if let Some(user) = credentials.get("user") {
                request = request.basic_auth(user, credentials.get("token"));
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReconcilerError::ControlApi(format!("POST {url}: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReconcilerError::ControlApi(format!("reading {url}: {e}")))?;
        if !status.is_success() {
            return Err(ReconcilerError::ControlApi(format!(
                "POST {url} returned {status}: {body}"
            )));
        }
        Ok(body)
    }
}
