//! Per-identity fan-out of notifications.
//!
//! Each identity gets a lane: an unbounded queue drained by its own task.
//! Notifications for one identity are therefore handled one at a time and in
//! submission order, while unrelated identities proceed concurrently.
//!
//! Transient failures of adds and updates are retried a bounded number of
//! times; the periodic resync covers whatever is still wrong afterwards.
//! Deletes are retried until they succeed, since a deleted identity is gone
//! from the cache and no resync would repeat them. They stop early only when
//! a newer notification for the same identity arrives or on shutdown.

use super::{FaultInjectorController, Notification};
use crate::config::RetrySettings;
use crate::declared::SpecKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

struct Lane {
    queue: mpsc::UnboundedSender<Notification>,
    worker: JoinHandle<()>,
    superseded: Arc<AtomicBool>,
}

struct Retiring {
    worker: JoinHandle<()>,
    /// Set once a newer lane exists for the same identity.
    superseded: Arc<AtomicBool>,
}

/// Routes notifications to per-identity lanes.
pub struct Dispatcher {
    controller: Arc<FaultInjectorController>,
    retry: RetrySettings,
    shutdown: watch::Receiver<bool>,
    lanes: HashMap<SpecKey, Lane>,
    /// Lanes closed by a delete that may still be draining.
    retiring: HashMap<SpecKey, Retiring>,
}

impl Dispatcher {
    /// Create a dispatcher. Once `shutdown` reads `true`, lanes stop starting
    /// queued notifications.
    pub fn new(
        controller: Arc<FaultInjectorController>,
        retry: RetrySettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            controller,
            retry,
            shutdown,
            lanes: HashMap::new(),
            retiring: HashMap::new(),
        }
    }

    /// Queue a notification on its identity's lane.
    ///
    /// A delete closes the lane after enqueueing; a later notification for
    /// the same identity opens a new lane that first waits for the old one.
    pub fn dispatch(&mut self, notification: Notification) {
        let key = notification.key();
        let is_delete = matches!(notification, Notification::Delete(_));

        self.retiring.retain(|_, retiring| !retiring.worker.is_finished());

        let lane = match self.lanes.remove(&key) {
            Some(lane) => lane,
            None => self.open_lane(key.clone()),
        };

        if lane.queue.send(notification).is_err() {
            tracing::debug!(key = %key, "Lane already stopped, dropping notification");
        }

        if is_delete {
            drop(lane.queue);
            self.retiring.insert(
                key,
                Retiring {
                    worker: lane.worker,
                    superseded: lane.superseded,
                },
            );
        } else {
            self.lanes.insert(key, lane);
        }
    }

    /// Number of open lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Close every lane and wait for the workers to finish.
    ///
    /// Without a prior shutdown signal the lanes drain their queues first;
    /// after one, only the notification in flight on each lane completes.
    pub async fn drain(mut self) {
        let workers: Vec<_> = self
            .lanes
            .drain()
            .map(|(_, lane)| lane.worker)
            .chain(self.retiring.drain().map(|(_, retiring)| retiring.worker))
            .collect();

        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Lane worker failed");
            }
        }
    }

    fn open_lane(&mut self, key: SpecKey) -> Lane {
        let (queue, rx) = mpsc::unbounded_channel();
        let previous = self.retiring.remove(&key).map(|retiring| {
            retiring.superseded.store(true, Ordering::SeqCst);
            retiring.worker
        });
        let superseded = Arc::new(AtomicBool::new(false));
        let worker = tokio::spawn(run_lane(
            key,
            rx,
            previous,
            Arc::clone(&superseded),
            Arc::clone(&self.controller),
            self.retry.clone(),
            self.shutdown.clone(),
        ));
        Lane {
            queue,
            worker,
            superseded,
        }
    }
}

async fn run_lane(
    key: SpecKey,
    mut rx: mpsc::UnboundedReceiver<Notification>,
    previous: Option<JoinHandle<()>>,
    superseded: Arc<AtomicBool>,
    controller: Arc<FaultInjectorController>,
    retry: RetrySettings,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    while let Some(mut notification) = rx.recv().await {
        let mut retries = 0;
        loop {
            if *shutdown.borrow() {
                return;
            }

            match controller.handle(&notification).await {
                Ok(outcome) => {
                    tracing::debug!(key = %key, kind = notification.kind(), ?outcome, "Handled notification");
                    break;
                }
                Err(e)
                    if e.is_transient()
                        && matches!(notification, Notification::Delete(_))
                        && superseded.load(Ordering::SeqCst) =>
                {
                    tracing::info!(
                        key = %key,
                        error = %e,
                        "Delete failed and was superseded by a newer notification"
                    );
                    break;
                }
                Err(e)
                    if e.is_transient()
                        && (matches!(notification, Notification::Delete(_))
                            || retries < retry.max_retries) =>
                {
                    retries += 1;
                    tracing::warn!(
                        key = %key,
                        kind = notification.kind(),
                        attempt = retries,
                        error = %e,
                        "Reconciliation failed, retrying"
                    );

                    // A newer notification supersedes the failing one.
                    if let Ok(next) = rx.try_recv() {
                        notification = next;
                        retries = 0;
                        continue;
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(retry.backoff()) => {}
                        _ = shutdown.changed() => return,
                    }
                }
                Err(e) => {
                    tracing::error!(
                        key = %key,
                        kind = notification.kind(),
                        error = %e,
                        "Reconciliation failed"
                    );
                    break;
                }
            }
        }
    }
}
