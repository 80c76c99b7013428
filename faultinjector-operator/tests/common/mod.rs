//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use faultinjector_operator::client::{Registration, WorkloadClient};
use faultinjector_operator::config::OperatorConfig;
use faultinjector_operator::controller::{ControllerContext, FaultInjectorController};
use faultinjector_operator::error::{OperatorError, OperatorResult};
use faultinjector_operator::DeclaredSpec;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::ResourceExt;
use kube::core::ErrorResponse;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

type Key = (String, String);

/// In-memory stand-in for the Kubernetes API.
///
/// Stores Deployments by namespace and name, fills in the defaults the API
/// server would add, and enforces resource versions on replace.
#[derive(Default)]
pub struct FakeCluster {
    workloads: Mutex<BTreeMap<Key, Deployment>>,
    crds: Mutex<HashSet<String>>,
    next_version: AtomicUsize,
    failures: AtomicUsize,
    delete_failures: AtomicUsize,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` reads with a 503.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` deletes with a 503.
    pub fn fail_next_deletes(&self, count: usize) {
        self.delete_failures.store(count, Ordering::SeqCst);
    }

    /// Block reads of the named workload until [`release`](Self::release).
    pub fn hold(&self, name: &str) {
        self.gates
            .lock()
            .insert(name.to_string(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, name: &str) {
        if let Some(gate) = self.gates.lock().get(name) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    /// Insert a workload directly, as a previous operator instance would have.
    pub fn seed(&self, mut workload: Deployment) {
        self.stamp(&mut workload);
        self.workloads.lock().insert(key_of(&workload), workload);
    }

    pub fn workload(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.workloads
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// `namespace/name` of every stored workload, sorted.
    pub fn names(&self) -> Vec<String> {
        self.workloads
            .lock()
            .keys()
            .map(|(ns, name)| format!("{ns}/{name}"))
            .collect()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn stamp(&self, workload: &mut Deployment) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst) + 1;
        workload.metadata.resource_version = Some(version.to_string());
        workload.metadata.uid.get_or_insert_with(|| format!("uid-{version}"));

        let containers = workload
            .spec
            .iter_mut()
            .filter_map(|spec| spec.template.spec.as_mut())
            .flat_map(|pod| pod.containers.iter_mut());
        for container in containers {
            container
                .termination_message_path
                .get_or_insert_with(|| "/dev/termination-log".to_string());
            container
                .image_pull_policy
                .get_or_insert_with(|| "IfNotPresent".to_string());
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl WorkloadClient for FakeCluster {
    async fn list_workloads(&self, label_selector: &str) -> OperatorResult<Vec<Deployment>> {
        let (key, value) = label_selector
            .split_once('=')
            .ok_or_else(|| OperatorError::InvalidConfig(format!("bad selector {label_selector}")))?;
        Ok(self
            .workloads
            .lock()
            .values()
            .filter(|w| w.labels().get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<Deployment>> {
        let gate = self.gates.lock().get(name).cloned();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }
        if Self::take_failure(&self.failures) {
            return Err(api_error(503, "ServiceUnavailable").into());
        }
        Ok(self.workload(namespace, name))
    }

    async fn create_workload(&self, workload: &Deployment) -> OperatorResult<()> {
        let key = key_of(workload);
        let mut workloads = self.workloads.lock();
        if workloads.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists").into());
        }
        let mut stored = workload.clone();
        self.stamp(&mut stored);
        workloads.insert(key, stored);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_workload(&self, workload: &Deployment) -> OperatorResult<()> {
        let key = key_of(workload);
        let mut workloads = self.workloads.lock();
        let Some(current) = workloads.get(&key) else {
            return Err(api_error(404, "NotFound").into());
        };
        if workload.metadata.resource_version.is_some()
            && workload.metadata.resource_version != current.metadata.resource_version
        {
            return Err(api_error(409, "Conflict").into());
        }
        let mut stored = workload.clone();
        self.stamp(&mut stored);
        workloads.insert(key, stored);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        if Self::take_failure(&self.delete_failures) {
            return Err(api_error(503, "ServiceUnavailable").into());
        }
        let removed = self
            .workloads
            .lock()
            .remove(&(namespace.to_string(), name.to_string()));
        if removed.is_some() {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn register_resource_type(
        &self,
        crd: &CustomResourceDefinition,
    ) -> OperatorResult<Registration> {
        if self.crds.lock().insert(crd.name_any()) {
            Ok(Registration::Created)
        } else {
            Ok(Registration::AlreadyExists)
        }
    }

    async fn resource_type_established(&self, name: &str) -> OperatorResult<bool> {
        Ok(self.crds.lock().contains(name))
    }
}

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("fake cluster: {reason}"),
        reason: reason.to_string(),
        code,
    })
}

fn key_of(workload: &Deployment) -> Key {
    (workload.namespace().unwrap_or_default(), workload.name_any())
}

/// Controller context over `cluster` with a fresh cache.
pub fn test_context(cluster: &Arc<FakeCluster>) -> Arc<ControllerContext> {
    let client: Arc<dyn WorkloadClient> = cluster.clone();
    Arc::new(ControllerContext::new(client, OperatorConfig::default()))
}

pub fn test_controller(ctx: &Arc<ControllerContext>) -> Arc<FaultInjectorController> {
    Arc::new(FaultInjectorController::new(Arc::clone(ctx)))
}

/// A `PodKiller` spec in `default`.
pub fn pod_killer(name: &str) -> DeclaredSpec {
    DeclaredSpec::new("default", name, "PodKiller")
}
