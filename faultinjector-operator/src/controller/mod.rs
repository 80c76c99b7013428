//! Reconciliation of FaultInjector resources.
//!
//! Startup runs [`registration::ensure_registered`] and then
//! [`bootstrap::scan`]; afterwards watcher events are translated into
//! [`Notification`]s by [`FeedTranslator`] and fanned out by the
//! [`Dispatcher`] to per-identity lanes, each of which drives the
//! [`FaultInjectorController`].
//!
//! ```ignore
//! use faultinjector_operator::controller::{ControllerContext, runner};
//!
//! let ctx = Arc::new(ControllerContext::new(client, config));
//! runner::run(ctx, FaultInjector::crd(), events, shutdown_rx).await?;
//! ```

pub mod bootstrap;
mod dispatch;
mod feed;
mod reconciler;
pub mod registration;
pub mod runner;

pub use dispatch::Dispatcher;
pub use feed::{FeedTranslator, Notification};
pub use reconciler::FaultInjectorController;

use crate::cache::DeclaredStateCache;
use crate::client::WorkloadClient;
use crate::config::OperatorConfig;
use std::sync::Arc;

/// Shared context for controllers.
pub struct ControllerContext {
    /// Cluster access.
    pub client: Arc<dyn WorkloadClient>,
    /// Last-known declared specs.
    pub cache: Arc<DeclaredStateCache>,
    /// Operator configuration.
    pub config: OperatorConfig,
}

impl ControllerContext {
    /// Create a new controller context with an empty cache.
    pub fn new(client: Arc<dyn WorkloadClient>, config: OperatorConfig) -> Self {
        Self {
            client,
            cache: Arc::new(DeclaredStateCache::new()),
            config,
        }
    }
}

/// What handling a single notification did to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The derived workload did not exist and was created.
    Created,
    /// The derived workload existed and was rewritten.
    Updated,
    /// The derived workload already matched; nothing was written.
    Unchanged,
    /// The derived workload was deleted.
    Deleted,
    /// There was nothing to delete.
    AlreadyAbsent,
}
