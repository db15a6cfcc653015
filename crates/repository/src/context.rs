//! Store Context Ports - what the repository needs from a storage engine
//!
//! ```text
//! Repository              │  Store adapter
//! ────────────────────────┼──────────────────────────────
//! main_context()          │  shared read context
//!   fetch / subscribe     │    reads committed state
//!   merge_changes         │    broadcasts change sets
//! run_background_task()   │  one isolated WriteContext per task
//!   fetch / stage / save  │    pending changes, conflict merge
//! ```

use std::sync::Arc;

use shared::{ChangeSet, ConflictPolicy, FetchRequest, Record, RecordId, StoreError};
use tokio::sync::broadcast;

/// Unit of work handed to [`StoreContextSource::run_background_task`]
pub type BackgroundTask = Box<dyn FnOnce(&mut dyn WriteContext) + Send + 'static>;

/// Supplies the main read context and schedules isolated write tasks
pub trait StoreContextSource: Send + Sync + 'static {
    fn main_context(&self) -> Arc<dyn ReadContext>;

    /// Run `task` on a fresh write context. Must eventually execute it;
    /// results travel back through channels the task captures.
    fn run_background_task(&self, task: BackgroundTask);
}

/// The shared, read-oriented context
///
/// Application code never writes through it. It only learns about writes
/// through [`ReadContext::merge_changes`].
pub trait ReadContext: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>, StoreError>;

    /// Propagate a committed change set and notify subscribers
    fn merge_changes(&self, changes: ChangeSet);

    /// Change notifications, one per merged change set
    fn subscribe(&self) -> broadcast::Receiver<ChangeSet>;
}

/// An isolated context owned by exactly one background task
pub trait WriteContext: Send {
    /// Fetch records including this context's pending changes
    fn fetch(&mut self, request: &FetchRequest) -> Result<Vec<Record>, StoreError>;

    /// Fetch identities only
    fn fetch_ids(&mut self, request: &FetchRequest) -> Result<Vec<RecordId>, StoreError>;

    /// Allocate an empty record of `entity`. Not pending until staged.
    fn new_record(&mut self, entity: &str) -> Record;

    /// Register the record's current state as a pending insert or update
    fn stage(&mut self, record: Record);

    /// Mark a record for deletion
    fn delete(&mut self, id: RecordId);

    fn has_changes(&self) -> bool;

    fn set_conflict_policy(&mut self, policy: ConflictPolicy);

    /// Persist pending changes and report what was written
    fn save(&mut self) -> Result<ChangeSet, StoreError>;

    /// Delete every matching committed record in one operation.
    ///
    /// Bypasses pending changes and change notification.
    fn execute_batch_delete(
        &mut self,
        request: &FetchRequest,
        result_type: BatchResultType,
    ) -> Result<BatchDeleteResult, StoreError>;
}

/// What a batch delete should report back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchResultType {
    StatusOnly,
    Count,
    ObjectIds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchDeleteResult {
    Status(bool),
    Count(usize),
    ObjectIds(Vec<RecordId>),
}
