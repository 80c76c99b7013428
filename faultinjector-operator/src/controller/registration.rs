//! Registration of the FaultInjector resource type.

use crate::client::{Registration, WorkloadClient};
use crate::config::RegistrationSettings;
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tokio::time::Instant;

/// Register a CRD and wait until the API server serves it.
///
/// An existing registration counts as success. Availability is polled every
/// `settings.poll_interval()` until `settings.timeout()` has elapsed, after
/// which [`OperatorError::RegistrationTimeout`] is returned. API errors abort
/// immediately.
pub async fn ensure_registered(
    client: &dyn WorkloadClient,
    crd: &CustomResourceDefinition,
    settings: &RegistrationSettings,
) -> OperatorResult<()> {
    let name = crd
        .metadata
        .name
        .clone()
        .ok_or_else(|| OperatorError::InvalidConfig("CRD has no name".into()))?;

    match client.register_resource_type(crd).await? {
        Registration::Created => tracing::info!(crd = %name, "Created CustomResourceDefinition"),
        Registration::AlreadyExists => {
            tracing::info!(crd = %name, "CustomResourceDefinition already registered")
        }
    }

    let deadline = Instant::now() + settings.timeout();
    loop {
        tracing::debug!(crd = %name, "Checking that CustomResourceDefinition is established");
        if client.resource_type_established(&name).await? {
            tracing::info!(crd = %name, "CustomResourceDefinition established");
            return Ok(());
        }

        if Instant::now() + settings.poll_interval() > deadline {
            return Err(OperatorError::RegistrationTimeout {
                name,
                timeout: settings.timeout(),
            });
        }
        tokio::time::sleep(settings.poll_interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockWorkloadClient;
    use crate::crd::{FAULT_INJECTOR_CRD_NAME, FaultInjector};
    use kube::CustomResourceExt;
    use kube::core::ErrorResponse;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn already_registered_then_established() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);

        let mut client = MockWorkloadClient::new();
        client
            .expect_register_resource_type()
            .times(1)
            .returning(|_| Ok(Registration::AlreadyExists));
        client
            .expect_resource_type_established()
            .withf(|name| name == FAULT_INJECTOR_CRD_NAME)
            .returning(move |_| Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2));

        let started = Instant::now();
        ensure_registered(&client, &FaultInjector::crd(), &RegistrationSettings::default())
            .await
            .expect("registration succeeds");

        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_established() {
        let mut client = MockWorkloadClient::new();
        client
            .expect_register_resource_type()
            .returning(|_| Ok(Registration::Created));
        client
            .expect_resource_type_established()
            .returning(|_| Ok(false));

        let started = Instant::now();
        let err = ensure_registered(&client, &FaultInjector::crd(), &RegistrationSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OperatorError::RegistrationTimeout { .. }));
        assert!(started.elapsed() <= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn api_errors_abort_immediately() {
        let mut client = MockWorkloadClient::new();
        client.expect_register_resource_type().returning(|_| {
            Err(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "forbidden".into(),
                reason: "Forbidden".into(),
                code: 403,
            })
            .into())
        });
        client.expect_resource_type_established().never();

        let err = ensure_registered(&client, &FaultInjector::crd(), &RegistrationSettings::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
