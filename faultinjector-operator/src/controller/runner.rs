//! Operator main loop.

use super::{ControllerContext, Dispatcher, FaultInjectorController, FeedTranslator, bootstrap, registration};
use crate::crd::FaultInjector;
use crate::error::OperatorResult;
use futures::{Stream, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::runtime::watcher;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

/// Run the operator until `events` ends or `shutdown` turns `true`.
///
/// Startup registers `crd` and seeds the cache from existing derived
/// workloads; a failure in either is returned before any event is consumed.
/// Afterwards watcher errors and reconcile failures are logged and the loop
/// keeps going. On exit the dispatcher is drained, so notifications already
/// in flight complete before this returns.
pub async fn run<S>(
    ctx: Arc<ControllerContext>,
    crd: &CustomResourceDefinition,
    mut events: S,
    mut shutdown: watch::Receiver<bool>,
) -> OperatorResult<()>
where
    S: Stream<Item = Result<watcher::Event<FaultInjector>, watcher::Error>> + Unpin,
{
    registration::ensure_registered(ctx.client.as_ref(), crd, &ctx.config.registration).await?;

    let recovered = bootstrap::scan(ctx.client.as_ref(), &ctx.cache).await?;
    tracing::info!(recovered, "Recovered declared state from derived workloads");

    let controller = Arc::new(FaultInjectorController::new(Arc::clone(&ctx)));
    let mut feed = FeedTranslator::new(Arc::clone(&ctx.cache));
    let mut dispatcher = Dispatcher::new(controller, ctx.config.retry.clone(), shutdown.clone());

    let period = ctx.config.resync_interval();
    let mut resync = tokio::time::interval_at(Instant::now() + period, period);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(resync = ?period, "Watching FaultInjector resources");

    while !*shutdown.borrow() {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = events.next() => match event {
                Some(Ok(event)) => {
                    for notification in feed.translate(event) {
                        tracing::debug!(key = %notification.key(), kind = notification.kind(), "Dispatching notification");
                        dispatcher.dispatch(notification);
                    }
                }
                Some(Err(e)) => tracing::warn!(error = %e, "FaultInjector watch error"),
                None => {
                    tracing::info!("FaultInjector watch ended");
                    break;
                }
            },
            _ = resync.tick() => {
                let notifications = feed.resync();
                tracing::debug!(count = notifications.len(), "Resyncing declared specs");
                for notification in notifications {
                    dispatcher.dispatch(notification);
                }
            }
        }
    }

    tracing::info!("Stopping, waiting for in-flight reconciliations");
    dispatcher.drain().await;
    Ok(())
}
