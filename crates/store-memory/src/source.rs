//! In-memory context source
//!
//! One committed store, one main context over it, and a fresh
//! [`MemoryWriteContext`] for every background task.

use std::sync::Arc;

use repository::{BackgroundTask, ReadContext, StoreContextSource, WriteContext};
use tokio::runtime::Handle;
use tracing::trace;

use crate::main_context::MainContext;
use crate::store::MemoryStore;
use crate::write_context::MemoryWriteContext;

#[derive(Debug, Clone)]
pub struct InMemoryContextSource {
    store: MemoryStore,
    main: Arc<MainContext>,
}

impl InMemoryContextSource {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    /// Source over an existing store, e.g. to share it between sources
    pub fn with_store(store: MemoryStore) -> Self {
        let main = Arc::new(MainContext::new(store.clone()));
        Self { store, main }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn main(&self) -> &Arc<MainContext> {
        &self.main
    }

    /// A write context outside any background task
    pub fn new_write_context(&self) -> MemoryWriteContext {
        MemoryWriteContext::new(self.store.clone())
    }
}

impl Default for InMemoryContextSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreContextSource for InMemoryContextSource {
    fn main_context(&self) -> Arc<dyn ReadContext> {
        self.main.clone()
    }

    fn run_background_task(&self, task: BackgroundTask) {
        let mut context = self.new_write_context();
        let work = move || {
            trace!("background task started");
            task(&mut context as &mut dyn WriteContext);
        };

        // Work is synchronous and takes locks, keep it off the async workers
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(work);
            }
            Err(_) => {
                std::thread::spawn(work);
            }
        }
    }
}
