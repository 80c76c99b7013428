//! The PodKiller fault.
//!
//! Runs inside the Deployment generated for a `PodKiller` FaultInjector and
//! deletes one randomly chosen pod of its namespace per interval.

use crate::error::{OperatorError, OperatorResult};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, ResourceExt};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[cfg(test)]
use mockall::automock;

/// Namespace used when neither a value nor a file is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default time between two kills.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Pod operations within a single namespace.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodClient: Send + Sync {
    /// Names of all pods in the namespace.
    async fn list_pods(&self) -> OperatorResult<Vec<String>>;

    /// Delete a pod by name.
    async fn delete_pod(&self, name: &str) -> OperatorResult<()>;
}

/// [`PodClient`] backed by a real Kubernetes client.
pub struct KubePodClient {
    pods: Api<Pod>,
}

impl KubePodClient {
    /// Client for the pods of `namespace`.
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn list_pods(&self) -> OperatorResult<Vec<String>> {
        let list = self.pods.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|pod| pod.name_any()).collect())
    }

    async fn delete_pod(&self, name: &str) -> OperatorResult<()> {
        self.pods.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}

/// Periodically deletes a random pod.
pub struct PodKiller {
    client: Arc<dyn PodClient>,
    namespace: String,
    rng: Mutex<StdRng>,
}

impl PodKiller {
    /// Create a pod killer for `namespace`.
    pub fn new(client: Arc<dyn PodClient>, namespace: impl Into<String>) -> Self {
        Self::with_rng(client, namespace, StdRng::from_entropy())
    }

    /// Create a pod killer with a fixed seed, for reproducible victim choice.
    pub fn with_seed(client: Arc<dyn PodClient>, namespace: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(client, namespace, StdRng::seed_from_u64(seed))
    }

    fn with_rng(client: Arc<dyn PodClient>, namespace: impl Into<String>, rng: StdRng) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            rng: Mutex::new(rng),
        }
    }

    /// Pick a pod uniformly at random.
    pub fn choose_victim<'a>(&self, pods: &'a [String]) -> Option<&'a String> {
        pods.choose(&mut *self.rng.lock())
    }

    /// Delete one random pod. Returns the deleted pod's name, or `None` when
    /// the namespace has no pods.
    pub async fn kill_once(&self) -> OperatorResult<Option<String>> {
        let pods = self.client.list_pods().await?;
        let Some(victim) = self.choose_victim(&pods).cloned() else {
            tracing::debug!(namespace = %self.namespace, "No pods to kill");
            return Ok(None);
        };

        tracing::info!(namespace = %self.namespace, pod = %victim, "Killing pod");
        self.client.delete_pod(&victim).await?;
        Ok(Some(victim))
    }

    /// Kill a pod now and then once per `interval` until `shutdown` turns
    /// `true`. Failures are logged and do not stop the loop.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.kill_once().await {
                        tracing::warn!(namespace = %self.namespace, error = %e, "Failed to kill pod");
                    }
                }
            }
        }
    }
}

/// Work out the namespace from `--namespace` or `--namespace-file`.
///
/// The two are mutually exclusive. File contents are trimmed. With neither,
/// [`DEFAULT_NAMESPACE`] is used.
pub fn resolve_namespace(value: Option<&str>, file: Option<&Path>) -> OperatorResult<String> {
    match (value, file) {
        (Some(_), Some(_)) => Err(OperatorError::InvalidConfig(
            "Cannot specify both --namespace and --namespace-file".into(),
        )),
        (Some(value), None) => Ok(value.to_string()),
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                OperatorError::InvalidConfig(format!(
                    "Error when attempting to read namespace from {}: {e}",
                    path.display()
                ))
            })?;
            Ok(raw.trim().to_string())
        }
        (None, None) => Ok(DEFAULT_NAMESPACE.to_string()),
    }
}
