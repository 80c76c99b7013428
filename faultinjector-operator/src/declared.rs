//! Declared state as the operator sees it.

use crate::crd::{FaultInjector, FaultInjectorSpec};
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a declared spec: `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpecKey {
    /// Namespace of the FaultInjector.
    pub namespace: String,
    /// Name of the FaultInjector.
    pub name: String,
}

impl SpecKey {
    /// Build a key from its parts.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SpecKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The last-known content of a FaultInjector, reduced to what drives the
/// derived workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSpec {
    /// Namespace of the FaultInjector.
    pub namespace: String,
    /// Name of the FaultInjector.
    pub name: String,
    /// Raw `spec.type`; validated only when compiling.
    pub fault_type: String,
    /// Labels of the FaultInjector.
    pub labels: BTreeMap<String, String>,
}

impl DeclaredSpec {
    /// Build a declared spec with no labels.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        fault_type: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            fault_type: fault_type.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Identity of this spec.
    pub fn key(&self) -> SpecKey {
        SpecKey::new(&self.namespace, &self.name)
    }

    /// Reduce a FaultInjector resource. Fails for resources without a namespace.
    pub fn from_resource(resource: &FaultInjector) -> OperatorResult<Self> {
        let name = resource.name_any();
        let namespace = resource.namespace().ok_or_else(|| {
            OperatorError::InvalidConfig(format!("FaultInjector {name} must be namespaced"))
        })?;

        Ok(Self {
            namespace,
            name,
            fault_type: resource.spec.fault_type.clone(),
            labels: resource.labels().clone(),
        })
    }

    /// Render back into a FaultInjector resource.
    pub fn to_resource(&self) -> FaultInjector {
        let mut resource = FaultInjector::new(
            &self.name,
            FaultInjectorSpec {
                fault_type: self.fault_type.clone(),
            },
        );
        resource.metadata = ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
            ..Default::default()
        };
        resource
    }
}
