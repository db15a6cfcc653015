//! Main read context
//!
//! Reads straight from the committed state, so it never holds stale
//! objects; `merge_changes` therefore only has to fan the change set out to
//! subscribers.

use std::sync::atomic::{AtomicU64, Ordering};

use repository::ReadContext;
use shared::{ChangeSet, FetchRequest, Record, StoreError};
use tokio::sync::broadcast;
use tracing::debug;

use crate::store::MemoryStore;

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct MainContext {
    store: MemoryStore,
    notifier: broadcast::Sender<ChangeSet>,
    merges: AtomicU64,
}

impl MainContext {
    pub fn new(store: MemoryStore) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            store,
            notifier,
            merges: AtomicU64::new(0),
        }
    }

    /// How many non-empty change sets have been merged
    pub fn merge_count(&self) -> u64 {
        self.merges.load(Ordering::Relaxed)
    }
}

impl ReadContext for MainContext {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>, StoreError> {
        let state = self.store.read()?;
        Ok(request.apply(
            state
                .records()
                .filter(|stored| stored.record.entity() == request.entity)
                .map(|stored| stored.record.clone()),
        ))
    }

    fn merge_changes(&self, changes: ChangeSet) {
        if changes.is_empty() {
            return;
        }
        self.merges.fetch_add(1, Ordering::Relaxed);
        debug!(changes = changes.len(), "merged changes into main context");
        // No receivers is fine: nobody is observing
        let _ = self.notifier.send(changes);
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.notifier.subscribe()
    }
}
