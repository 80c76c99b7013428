//! Recovery of declared state after a restart.
//!
//! The operator keeps no state of its own. The Deployments it generated are
//! its durable record: each one names the FaultInjector it came from and
//! carries that spec's labels and fault type.

use crate::cache::DeclaredStateCache;
use crate::client::WorkloadClient;
use crate::error::OperatorResult;
use crate::resources;

/// Seed the cache from the operator-generated Deployments of every namespace.
///
/// All workloads are reconstructed before the cache is touched: a
/// mislabelled foreign Deployment aborts the scan with
/// [`MalformedDerivedName`](crate::error::OperatorError::MalformedDerivedName)
/// and leaves the cache as it was. Returns the number of specs recovered.
pub async fn scan(client: &dyn WorkloadClient, cache: &DeclaredStateCache) -> OperatorResult<usize> {
    let selector = resources::marker_selector();
    let workloads = client.list_workloads(&selector).await?;

    tracing::info!(selector = %selector, count = workloads.len(), "Scanning existing derived workloads");

    let specs = workloads
        .iter()
        .map(resources::reconstruct)
        .collect::<OperatorResult<Vec<_>>>()?;

    let recovered = specs.len();
    for spec in specs {
        tracing::debug!(name = %spec.name, namespace = %spec.namespace, "Recovered FaultInjector from derived workload");
        cache.put(spec);
    }

    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockWorkloadClient;
    use crate::config::ImageSettings;
    use crate::declared::{DeclaredSpec, SpecKey};
    use crate::error::OperatorError;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn derived(spec: &DeclaredSpec) -> Deployment {
        resources::compile(spec, &ImageSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn seeds_cache_from_marked_workloads() {
        let hydrogen = DeclaredSpec::new("default", "hydrogen", "PodKiller");
        let sodium = DeclaredSpec::new("chaos", "sodium", "PodKiller").with_label("group", "alkali");
        let workloads = vec![derived(&hydrogen), derived(&sodium)];

        let mut client = MockWorkloadClient::new();
        client
            .expect_list_workloads()
            .withf(|selector| selector == "generatedBy=FaultInjector")
            .returning(move |_| Ok(workloads.clone()));

        let cache = DeclaredStateCache::new();
        assert_eq!(scan(&client, &cache).await.unwrap(), 2);
        assert_eq!(cache.get(&SpecKey::new("default", "hydrogen")), Some(hydrogen));
        assert_eq!(cache.get(&SpecKey::new("chaos", "sodium")), Some(sodium));
    }

    #[tokio::test]
    async fn foreign_workload_aborts_scan() {
        let hydrogen = DeclaredSpec::new("default", "hydrogen", "PodKiller");
        let foreign = Deployment {
            metadata: ObjectMeta {
                name: Some("nginx".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let workloads = vec![derived(&hydrogen), foreign];

        let mut client = MockWorkloadClient::new();
        client
            .expect_list_workloads()
            .returning(move |_| Ok(workloads.clone()));

        let cache = DeclaredStateCache::new();
        let err = scan(&client, &cache).await.unwrap_err();
        assert!(matches!(err, OperatorError::MalformedDerivedName { name } if name == "nginx"));
        assert!(cache.is_empty());
    }
}
