//! Translation of watcher events into typed notifications.

use crate::cache::DeclaredStateCache;
use crate::crd::FaultInjector;
use crate::declared::{DeclaredSpec, SpecKey};
use kube::runtime::watcher;
use std::collections::HashSet;
use std::sync::Arc;

/// A change to one declared spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The spec was not known before.
    Add(DeclaredSpec),
    /// The spec was known and may have changed; also used for resyncs.
    Update(DeclaredSpec),
    /// The spec is gone; carries its last-known content.
    Delete(DeclaredSpec),
}

impl Notification {
    /// The spec carried by this notification.
    pub fn spec(&self) -> &DeclaredSpec {
        match self {
            Notification::Add(spec) | Notification::Update(spec) | Notification::Delete(spec) => {
                spec
            }
        }
    }

    /// Identity the notification is about.
    pub fn key(&self) -> SpecKey {
        self.spec().key()
    }

    /// Short name of the notification kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Add(_) => "add",
            Notification::Update(_) => "update",
            Notification::Delete(_) => "delete",
        }
    }
}

/// Keeps the [`DeclaredStateCache`] in step with the watcher and derives
/// notifications from the difference.
///
/// A relist (`Init` .. `InitDone`) ends with a `Delete` for every cached
/// identity the relist did not contain, which also clears entries seeded by
/// the bootstrap scan whose FaultInjector was removed while the operator was
/// down.
pub struct FeedTranslator {
    cache: Arc<DeclaredStateCache>,
    relisted: Option<HashSet<SpecKey>>,
}

impl FeedTranslator {
    /// Create a translator writing to `cache`.
    pub fn new(cache: Arc<DeclaredStateCache>) -> Self {
        Self {
            cache,
            relisted: None,
        }
    }

    /// Apply one watcher event to the cache and return what changed.
    pub fn translate(&mut self, event: watcher::Event<FaultInjector>) -> Vec<Notification> {
        match event {
            watcher::Event::Apply(resource) => self.apply(&resource).into_iter().collect(),
            watcher::Event::Delete(resource) => self.delete(&resource).into_iter().collect(),
            watcher::Event::Init => {
                tracing::debug!("FaultInjector relist started");
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(resource) => {
                let notification = self.apply(&resource);
                if let (Some(seen), Some(n)) = (self.relisted.as_mut(), notification.as_ref()) {
                    seen.insert(n.key());
                }
                notification.into_iter().collect()
            }
            watcher::Event::InitDone => self.finish_relist(),
        }
    }

    /// An `Update` for every known spec.
    pub fn resync(&self) -> Vec<Notification> {
        self.cache
            .snapshot()
            .into_iter()
            .map(Notification::Update)
            .collect()
    }

    fn apply(&mut self, resource: &FaultInjector) -> Option<Notification> {
        let spec = declared(resource)?;
        match self.cache.put(spec.clone()) {
            None => Some(Notification::Add(spec)),
            Some(_) => Some(Notification::Update(spec)),
        }
    }

    fn delete(&mut self, resource: &FaultInjector) -> Option<Notification> {
        let spec = declared(resource)?;
        self.cache.remove(&spec.key());
        Some(Notification::Delete(spec))
    }

    fn finish_relist(&mut self) -> Vec<Notification> {
        let Some(seen) = self.relisted.take() else {
            return Vec::new();
        };

        let vanished: Vec<_> = self
            .cache
            .keys()
            .into_iter()
            .filter(|key| !seen.contains(key))
            .filter_map(|key| self.cache.remove(&key))
            .map(Notification::Delete)
            .collect();

        tracing::debug!(
            listed = seen.len(),
            vanished = vanished.len(),
            "FaultInjector relist complete"
        );
        vanished
    }
}

fn declared(resource: &FaultInjector) -> Option<DeclaredSpec> {
    match DeclaredSpec::from_resource(resource) {
        Ok(spec) => Some(spec),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring FaultInjector");
            None
        }
    }
}
