//! FaultInjector Kubernetes Operator
//!
//! This crate provides a Kubernetes operator that turns `FaultInjector`
//! custom resources into fault-injection workloads, plus the fault programs
//! those workloads run.
//!
//! # Custom Resource Definitions
//!
//! - **FaultInjector**: Declares a fault to run in its namespace. Each one is
//!   materialized as a Deployment named `faultinjector-<name>`.
//!
//! # Fault types
//!
//! - **PodKiller**: Deletes a random pod of the namespace every minute.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: k8s.puppet.com/v1alpha1
//! kind: FaultInjector
//! metadata:
//!   name: chaos
//!   namespace: staging
//!   labels:
//!     team: platform
//! spec:
//!   type: PodKiller
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod crd;
pub mod declared;
pub mod error;
pub mod podkiller;
pub mod resources;
pub mod version;

pub use cache::DeclaredStateCache;
pub use client::{KubeWorkloadClient, WorkloadClient};
pub use config::OperatorConfig;
pub use crd::{FaultInjector, FaultInjectorSpec, FaultType};
pub use declared::{DeclaredSpec, SpecKey};
pub use error::{OperatorError, OperatorResult};
