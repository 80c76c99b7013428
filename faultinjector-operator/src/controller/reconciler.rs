//! FaultInjector controller.
//!
//! Drives the cluster so that each declared spec has exactly its derived
//! Deployment. Every operation re-reads the cluster first, so handling the
//! same notification twice is harmless.

use super::{ControllerContext, Notification, ReconcileOutcome};
use crate::declared::DeclaredSpec;
use crate::error::OperatorResult;
use crate::resources;
use std::sync::Arc;

/// Controller for FaultInjector resources.
#[derive(Clone)]
pub struct FaultInjectorController {
    ctx: Arc<ControllerContext>,
}

impl FaultInjectorController {
    /// Create a new FaultInjector controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Apply one notification.
    pub async fn handle(&self, notification: &Notification) -> OperatorResult<ReconcileOutcome> {
        match notification {
            Notification::Add(spec) | Notification::Update(spec) => self.reconcile(spec).await,
            Notification::Delete(spec) => self.cleanup(spec).await,
        }
    }

    /// Create or update the derived workload of a spec.
    ///
    /// Compiler errors surface before any write, so a rejected spec leaves
    /// the cluster exactly as it was.
    pub async fn reconcile(&self, spec: &DeclaredSpec) -> OperatorResult<ReconcileOutcome> {
        let name = resources::derived_name(&spec.name);
        let images = &self.ctx.config.images;

        tracing::debug!(
            name = %spec.name,
            namespace = %spec.namespace,
            fault_type = %spec.fault_type,
            "Reconciling FaultInjector"
        );

        match self.ctx.client.get_workload(&spec.namespace, &name).await? {
            None => {
                let workload = resources::compile(spec, images)?;
                tracing::info!(name = %name, namespace = %spec.namespace, "Creating derived Deployment");
                self.ctx.client.create_workload(&workload).await?;
                Ok(ReconcileOutcome::Created)
            }
            Some(existing) => {
                if resources::is_converged(&existing, spec, images)? {
                    tracing::debug!(name = %name, namespace = %spec.namespace, "Derived Deployment up to date");
                    return Ok(ReconcileOutcome::Unchanged);
                }

                let mut updated = existing;
                resources::apply_update(&mut updated, spec, images)?;
                tracing::info!(name = %name, namespace = %spec.namespace, "Updating derived Deployment");
                self.ctx.client.update_workload(&updated).await?;
                Ok(ReconcileOutcome::Updated)
            }
        }
    }

    /// Remove the derived workload of a spec that no longer exists.
    pub async fn cleanup(&self, spec: &DeclaredSpec) -> OperatorResult<ReconcileOutcome> {
        let name = resources::derived_name(&spec.name);

        if self
            .ctx
            .client
            .get_workload(&spec.namespace, &name)
            .await?
            .is_none()
        {
            tracing::debug!(name = %name, namespace = %spec.namespace, "Derived Deployment already gone");
            return Ok(ReconcileOutcome::AlreadyAbsent);
        }

        tracing::info!(name = %name, namespace = %spec.namespace, "Deleting derived Deployment");
        self.ctx
            .client
            .delete_workload(&spec.namespace, &name)
            .await?;
        Ok(ReconcileOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockWorkloadClient;
    use crate::config::OperatorConfig;
    use crate::error::OperatorError;

    fn controller(client: MockWorkloadClient) -> FaultInjectorController {
        FaultInjectorController::new(Arc::new(ControllerContext::new(
            Arc::new(client),
            OperatorConfig::default(),
        )))
    }

    #[tokio::test]
    async fn unsupported_type_writes_nothing() {
        let mut client = MockWorkloadClient::new();
        client.expect_get_workload().returning(|_, _| Ok(None));
        client.expect_create_workload().never();
        client.expect_update_workload().never();

        let spec = DeclaredSpec::new("default", "helium", "NetworkLatency");
        let err = controller(client).reconcile(&spec).await.unwrap_err();
        assert!(matches!(err, OperatorError::UnsupportedFaultType { .. }));
    }

    #[tokio::test]
    async fn unsupported_type_leaves_existing_workload_alone() {
        let config = OperatorConfig::default();
        let existing = resources::compile(
            &DeclaredSpec::new("default", "helium", "PodKiller"),
            &config.images,
        )
        .unwrap();

        let mut client = MockWorkloadClient::new();
        client
            .expect_get_workload()
            .returning(move |_, _| Ok(Some(existing.clone())));
        client.expect_update_workload().never();

        let spec = DeclaredSpec::new("default", "helium", "NetworkLatency");
        assert!(controller(client).reconcile(&spec).await.is_err());
    }

    #[tokio::test]
    async fn creates_missing_workload() {
        let mut client = MockWorkloadClient::new();
        client
            .expect_get_workload()
            .withf(|ns, name| ns == "default" && name == "faultinjector-hydrogen")
            .returning(|_, _| Ok(None));
        client
            .expect_create_workload()
            .withf(|w| w.metadata.name.as_deref() == Some("faultinjector-hydrogen"))
            .times(1)
            .returning(|_| Ok(()));

        let spec = DeclaredSpec::new("default", "hydrogen", "PodKiller");
        assert_eq!(
            controller(client).reconcile(&spec).await.unwrap(),
            ReconcileOutcome::Created
        );
    }

    #[tokio::test]
    async fn delete_of_missing_workload_is_noop() {
        let mut client = MockWorkloadClient::new();
        client.expect_get_workload().returning(|_, _| Ok(None));
        client.expect_delete_workload().never();

        let spec = DeclaredSpec::new("default", "hydrogen", "PodKiller");
        assert_eq!(
            controller(client).cleanup(&spec).await.unwrap(),
            ReconcileOutcome::AlreadyAbsent
        );
    }
}
