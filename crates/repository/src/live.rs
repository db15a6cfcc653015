//! Live query results
//!
//! A subscription listens to the main context's change notifications and
//! rebuilds the whole projection whenever a change touches its entity type.
//! No deltas: every refresh is a fresh fetch + convert, so inserts, updates,
//! deletes and reorderings all come out right without diffing.

use std::sync::Arc;

use shared::{FetchRequest, ProjectionMode, SearchRequest};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::{self, JoinHandle};
use tracing::{debug, warn};

use crate::context::ReadContext;
use crate::mapper::EntityMapper;
use crate::repository::projection::project;

/// Observer handle for a live result set
///
/// Cheap to clone; every clone sees the same snapshots.
#[derive(Debug, Clone)]
pub struct LiveResults<T> {
    receiver: watch::Receiver<Vec<T>>,
}

impl<T: Clone> LiveResults<T> {
    /// Latest snapshot
    pub fn current(&self) -> Vec<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the repository is gone.
    pub async fn changed(&mut self) -> Option<Vec<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate` (checks the current one first)
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&[T]) -> bool) -> Option<Vec<T>> {
        self.receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}

/// Live projection owned by a repository; stops when dropped
pub(crate) struct LiveQuerySubscription<T> {
    receiver: watch::Receiver<Vec<T>>,
    listener: Option<JoinHandle<()>>,
}

impl<T: Clone + Send + Sync + 'static> LiveQuerySubscription<T> {
    /// Subscribe, publish the initial snapshot and start listening.
    ///
    /// Needs a Tokio runtime to keep refreshing; without one the initial
    /// snapshot stays the only one.
    pub(crate) fn activate<M>(
        mapper: Arc<M>,
        main: Arc<dyn ReadContext>,
        request: &SearchRequest,
    ) -> Self
    where
        M: EntityMapper<Model = T>,
    {
        // Subscribe before the initial fetch so no change slips between them
        let mut changes = main.subscribe();
        let fetch = FetchRequest::from_search(mapper.entity_name(), request);
        let initial = snapshot(mapper.as_ref(), main.as_ref(), &fetch).unwrap_or_default();
        let (sender, receiver) = watch::channel(initial);

        let listener = match Handle::try_current() {
            Ok(handle) => Some(handle.spawn(async move {
                let entity = mapper.entity_name().to_string();
                loop {
                    match changes.recv().await {
                        Ok(change_set) if !change_set.touches(&entity) => continue,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(entity = %entity, skipped, "change notifications lagged; refreshing");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                    // Fetch and convert block on the store lock, keep them off the async workers
                    let refresh = {
                        let mapper = Arc::clone(&mapper);
                        let main = Arc::clone(&main);
                        let fetch = fetch.clone();
                        task::spawn_blocking(move || snapshot(mapper.as_ref(), main.as_ref(), &fetch))
                    };
                    match refresh.await {
                        Ok(Some(models)) => {
                            debug!(entity = %entity, count = models.len(), "live results refreshed");
                            sender.send_replace(models);
                        }
                        Ok(None) => {}
                        Err(e) => warn!(entity = %entity, error = %e, "live refresh task failed"),
                    }
                }
            })),
            Err(_) => {
                warn!(
                    entity = mapper.entity_name(),
                    "no Tokio runtime; live results will not refresh"
                );
                None
            }
        };

        Self { receiver, listener }
    }

    pub(crate) fn results(&self) -> LiveResults<T> {
        LiveResults {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> Drop for LiveQuerySubscription<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn snapshot<M: EntityMapper>(
    mapper: &M,
    main: &dyn ReadContext,
    fetch: &FetchRequest,
) -> Option<Vec<M::Model>> {
    let records = match main.fetch(fetch) {
        Ok(records) => records,
        Err(e) => {
            warn!(entity = mapper.entity_name(), error = %e, "live fetch failed");
            return None;
        }
    };
    project(mapper, &records, ProjectionMode::Lenient).ok()
}
