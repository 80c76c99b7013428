//! Error types for the fault-injector operator.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error. Every remote call failure lands here.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The declared fault type is not one the operator knows how to run.
    #[error("Unsupported value {fault_type} for spec.type on the FaultInjector")]
    UnsupportedFaultType {
        /// The rejected fault type.
        fault_type: String,
    },

    /// An update was attempted across two different identities.
    #[error(
        "Expected derived workload to have the same name as its FaultInjector ({expected}), but got {actual}"
    )]
    IdentityMismatch {
        /// Name derived from the declared spec.
        expected: String,
        /// Name carried by the existing workload.
        actual: String,
    },

    /// A marker-labelled workload whose name does not follow the derived naming scheme.
    #[error("Found an existing deployment that does not match expected name format: {name}")]
    MalformedDerivedName {
        /// Offending workload name.
        name: String,
    },

    /// The resource type did not become available in time.
    #[error("Resource type {name} was not established within {timeout:?}")]
    RegistrationTimeout {
        /// Resource type (CRD) name.
        name: String,
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// Invalid configuration or malformed input object.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl OperatorError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Only remote-call failures are transient; everything else reflects a
    /// declared spec or cluster object that must change first.
    pub fn is_transient(&self) -> bool {
        matches!(self, OperatorError::KubeError(_))
    }

    pub(crate) fn unsupported(fault_type: impl Into<String>) -> Self {
        OperatorError::UnsupportedFaultType {
            fault_type: fault_type.into(),
        }
    }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

/// Returns true when the error is an API response with the given HTTP status.
pub(crate) fn is_api_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}
