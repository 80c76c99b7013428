//! Access to the Kubernetes API.
//!
//! Controllers talk to the cluster only through [`WorkloadClient`], so tests
//! can substitute an in-memory or mocked implementation.

use crate::error::{OperatorResult, is_api_status};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

/// Outcome of registering a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The resource type was created by this call.
    Created,
    /// The resource type was already registered.
    AlreadyExists,
}

/// Operations the operator performs against the cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// List derived workloads in all namespaces matching a label selector.
    async fn list_workloads(&self, label_selector: &str) -> OperatorResult<Vec<Deployment>>;

    /// Fetch a derived workload; `None` when it does not exist.
    async fn get_workload(&self, namespace: &str, name: &str)
    -> OperatorResult<Option<Deployment>>;

    /// Create a derived workload.
    async fn create_workload(&self, workload: &Deployment) -> OperatorResult<()>;

    /// Replace a derived workload. The object's resource version, when set,
    /// makes the call fail on concurrent modification.
    async fn update_workload(&self, workload: &Deployment) -> OperatorResult<()>;

    /// Delete a derived workload. Deleting a missing workload succeeds.
    async fn delete_workload(&self, namespace: &str, name: &str) -> OperatorResult<()>;

    /// Register a custom resource type.
    async fn register_resource_type(
        &self,
        crd: &CustomResourceDefinition,
    ) -> OperatorResult<Registration>;

    /// Whether a custom resource type exists and is being served.
    async fn resource_type_established(&self, name: &str) -> OperatorResult<bool>;
}

/// [`WorkloadClient`] backed by a real Kubernetes client.
#[derive(Clone)]
pub struct KubeWorkloadClient {
    client: Client,
}

impl KubeWorkloadClient {
    /// Wrap a Kubernetes client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl WorkloadClient for KubeWorkloadClient {
    async fn list_workloads(&self, label_selector: &str) -> OperatorResult<Vec<Deployment>> {
        let deployments: Api<Deployment> = Api::all(self.client.clone());
        let list = deployments
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(list.items)
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<Deployment>> {
        Ok(self.deployments(namespace).get_opt(name).await?)
    }

    async fn create_workload(&self, workload: &Deployment) -> OperatorResult<()> {
        let namespace = workload.namespace().unwrap_or_default();
        self.deployments(&namespace)
            .create(&PostParams::default(), workload)
            .await?;
        Ok(())
    }

    async fn update_workload(&self, workload: &Deployment) -> OperatorResult<()> {
        let namespace = workload.namespace().unwrap_or_default();
        self.deployments(&namespace)
            .replace(&workload.name_any(), &PostParams::default(), workload)
            .await?;
        Ok(())
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        match self
            .deployments(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_api_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn register_resource_type(
        &self,
        crd: &CustomResourceDefinition,
    ) -> OperatorResult<Registration> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        match crds.create(&PostParams::default(), crd).await {
            Ok(_) => Ok(Registration::Created),
            Err(e) if is_api_status(&e, 409) => Ok(Registration::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn resource_type_established(&self, name: &str) -> OperatorResult<bool> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let Some(crd) = crds.get_opt(name).await? else {
            return Ok(false);
        };

        Ok(crd
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Established" && c.status == "True")
            }))
    }
}
