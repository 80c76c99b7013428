//! Derived workload construction.
//!
//! Everything in this module is pure: the same [`DeclaredSpec`] always yields
//! the same Deployment, and [`reconstruct`] inverts [`compile`] so that a
//! restarted operator can recover its declared state from the cluster.

use crate::config::ImageSettings;
use crate::crd::FaultType;
use crate::declared::DeclaredSpec;
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, DownwardAPIVolumeFile, DownwardAPIVolumeSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

/// Prefix of every derived workload name.
pub const DERIVED_NAME_PREFIX: &str = "faultinjector-";

/// Label marking a Deployment as operator-generated.
pub const MARKER_LABEL: &str = "generatedBy";

/// Value of [`MARKER_LABEL`].
pub const MARKER_VALUE: &str = "FaultInjector";

/// Pod template label carrying the fault type.
pub const TYPE_LABEL: &str = "faultinjector-type";

/// Pod template label used as the Deployment selector.
pub const INSTANCE_LABEL: &str = "faultinjector-instance";

const PODINFO_VOLUME: &str = "podinfo";
const PODINFO_MOUNT_PATH: &str = "/etc/podinfo";
const NAMESPACE_FILE: &str = "namespace";

/// Name of the workload derived from a FaultInjector called `spec_name`.
pub fn derived_name(spec_name: &str) -> String {
    format!("{DERIVED_NAME_PREFIX}{spec_name}")
}

/// Label selector matching every operator-generated workload.
pub fn marker_selector() -> String {
    format!("{MARKER_LABEL}={MARKER_VALUE}")
}

fn marker_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MARKER_LABEL.to_string(), MARKER_VALUE.to_string())])
}

fn selector_labels(spec: &DeclaredSpec) -> BTreeMap<String, String> {
    BTreeMap::from([(INSTANCE_LABEL.to_string(), spec.name.clone())])
}

/// The spec's labels with the fault type added.
///
/// The spec's own map is copied, never modified. A user label named
/// [`TYPE_LABEL`] is overwritten.
pub fn mirrored_labels(spec: &DeclaredSpec) -> BTreeMap<String, String> {
    let mut labels = spec.labels.clone();
    labels.insert(TYPE_LABEL.to_string(), spec.fault_type.clone());
    labels
}

fn template_labels(spec: &DeclaredSpec) -> BTreeMap<String, String> {
    let mut labels = mirrored_labels(spec);
    labels.extend(selector_labels(spec));
    labels
}

/// Containers implementing a fault.
pub fn fault_containers(fault: FaultType, images: &ImageSettings) -> Vec<Container> {
    match fault {
        FaultType::PodKiller => vec![Container {
            name: fault.component().to_string(),
            image: Some(images.image_for(fault)),
            args: Some(vec![
                "--namespace-file".to_string(),
                format!("{PODINFO_MOUNT_PATH}/{NAMESPACE_FILE}"),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: PODINFO_VOLUME.to_string(),
                mount_path: PODINFO_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        }],
    }
}

/// Downward API volume exposing the pod's namespace as a file.
fn podinfo_volumes() -> Vec<Volume> {
    vec![Volume {
        name: PODINFO_VOLUME.to_string(),
        downward_api: Some(DownwardAPIVolumeSource {
            items: Some(vec![DownwardAPIVolumeFile {
                path: NAMESPACE_FILE.to_string(),
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.namespace".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }]
}

/// Build the full derived Deployment for a spec.
///
/// Fails with [`OperatorError::UnsupportedFaultType`] for unknown fault types;
/// that is the only validation performed.
pub fn compile(spec: &DeclaredSpec, images: &ImageSettings) -> OperatorResult<Deployment> {
    let fault: FaultType = spec.fault_type.parse()?;

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(derived_name(&spec.name)),
            namespace: Some(spec.namespace.clone()),
            labels: Some(marker_labels()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(spec)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(template_labels(spec)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: fault_containers(fault, images),
                    volumes: Some(podinfo_volumes()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn check_identity(existing: &Deployment, spec: &DeclaredSpec) -> OperatorResult<()> {
    let expected = derived_name(&spec.name);
    let actual = existing.metadata.name.as_deref().unwrap_or_default();
    if actual != expected {
        return Err(OperatorError::IdentityMismatch {
            expected,
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Bring an existing derived Deployment in line with a spec.
///
/// Only the marker label, the pod template labels, containers and volumes are
/// rewritten; everything else, including server-populated fields, is kept.
/// On error the Deployment is left untouched.
pub fn apply_update(
    existing: &mut Deployment,
    spec: &DeclaredSpec,
    images: &ImageSettings,
) -> OperatorResult<()> {
    check_identity(existing, spec)?;
    let fault: FaultType = spec.fault_type.parse()?;

    let labels = template_labels(spec);
    let containers = fault_containers(fault, images);

    existing
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(marker_labels());

    let template = &mut existing.spec.get_or_insert_with(Default::default).template;
    template.metadata.get_or_insert_with(Default::default).labels = Some(labels);
    let pod = template.spec.get_or_insert_with(Default::default);
    pod.containers = containers;
    pod.volumes = Some(podinfo_volumes());

    Ok(())
}

/// Whether an existing derived Deployment already matches a spec.
///
/// Compares only the fields [`apply_update`] owns, and within those ignores
/// values the API server fills in (default modes, field API versions, pull
/// policies). Errors exactly when [`apply_update`] would.
pub fn is_converged(
    existing: &Deployment,
    spec: &DeclaredSpec,
    images: &ImageSettings,
) -> OperatorResult<bool> {
    check_identity(existing, spec)?;
    let fault: FaultType = spec.fault_type.parse()?;

    let marked = existing
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(MARKER_LABEL))
        .is_some_and(|value| value == MARKER_VALUE);

    let template = existing.spec.as_ref().map(|s| &s.template);
    let labels_match = template
        .and_then(|t| t.metadata.as_ref())
        .and_then(|m| m.labels.as_ref())
        .is_some_and(|labels| *labels == template_labels(spec));

    let desired = fault_containers(fault, images);
    let pod_matches = template.and_then(|t| t.spec.as_ref()).is_some_and(|pod| {
        pod.containers.len() == desired.len()
            && pod
                .containers
                .iter()
                .zip(&desired)
                .all(|(actual, wanted)| container_matches(actual, wanted))
            && volumes_match(pod.volumes.as_deref().unwrap_or_default(), &podinfo_volumes())
    });

    Ok(marked && labels_match && pod_matches)
}

fn container_matches(actual: &Container, wanted: &Container) -> bool {
    let mounts = |c: &Container| -> Vec<(String, String, bool)> {
        c.volume_mounts
            .iter()
            .flatten()
            .map(|m| (m.name.clone(), m.mount_path.clone(), m.read_only.unwrap_or(false)))
            .collect()
    };

    actual.name == wanted.name
        && actual.image == wanted.image
        && actual.command == wanted.command
        && actual.args == wanted.args
        && mounts(actual) == mounts(wanted)
}

fn volumes_match(actual: &[Volume], wanted: &[Volume]) -> bool {
    let files = |v: &Volume| -> Option<Vec<(String, Option<String>)>> {
        v.downward_api.as_ref().map(|api| {
            api.items
                .iter()
                .flatten()
                .map(|item| {
                    (
                        item.path.clone(),
                        item.field_ref.as_ref().map(|f| f.field_path.clone()),
                    )
                })
                .collect()
        })
    };

    actual.len() == wanted.len()
        && actual
            .iter()
            .zip(wanted)
            .all(|(a, w)| a.name == w.name && files(a) == files(w))
}

/// Recover the declared spec a derived Deployment was compiled from.
///
/// Fails with [`OperatorError::MalformedDerivedName`] when the name does not
/// carry the derived prefix. The fault type is not validated: the workload
/// already reflects a spec that was accepted once.
pub fn reconstruct(workload: &Deployment) -> OperatorResult<DeclaredSpec> {
    let name = workload.metadata.name.clone().unwrap_or_default();
    let spec_name = name
        .strip_prefix(DERIVED_NAME_PREFIX)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| OperatorError::MalformedDerivedName { name: name.clone() })?
        .to_string();

    let namespace = workload.metadata.namespace.clone().ok_or_else(|| {
        OperatorError::InvalidConfig(format!("Derived workload {name} has no namespace"))
    })?;

    let mut labels = workload
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    let fault_type = labels.remove(TYPE_LABEL).unwrap_or_default();
    labels.remove(INSTANCE_LABEL);

    Ok(DeclaredSpec {
        namespace,
        name: spec_name,
        fault_type,
        labels,
    })
}
