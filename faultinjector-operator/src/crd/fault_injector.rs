//! FaultInjector Custom Resource Definition.
//!
//! Declares a fault-injection task to run against the workloads of a namespace.

use crate::error::{OperatorError, OperatorResult};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FaultInjector is the Schema for the faultinjectors API.
///
/// The operator derives exactly one Deployment per FaultInjector, in the same
/// namespace, running the container that performs the declared fault.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "k8s.puppet.com",
    version = "v1alpha1",
    kind = "FaultInjector",
    plural = "faultinjectors",
    shortname = "fi",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FaultInjectorSpec {
    /// Fault to inject, e.g. `PodKiller`.
    ///
    /// Kept as a free-form string so that unknown values reach the operator
    /// and are reported there instead of being rejected by the API server.
    #[serde(rename = "type")]
    pub fault_type: String,
}

/// Name under which the FaultInjector CRD is registered.
pub const FAULT_INJECTOR_CRD_NAME: &str = "faultinjectors.k8s.puppet.com";

/// Fault types the operator knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Periodically deletes a random pod in the namespace.
    PodKiller,
}

impl FaultType {
    /// Every supported variant.
    pub const ALL: &'static [FaultType] = &[FaultType::PodKiller];

    /// Value used in `spec.type` and in the `faultinjector-type` label.
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultType::PodKiller => "PodKiller",
        }
    }

    /// Container (and image) name of the workload implementing this fault.
    pub fn component(&self) -> &'static str {
        match self {
            FaultType::PodKiller => "fault-injector-podkiller",
        }
    }
}

impl fmt::Display for FaultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultType {
    type Err = OperatorError;

    fn from_str(s: &str) -> OperatorResult<Self> {
        FaultType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OperatorError::unsupported(s))
    }
}
