//! Commit step shared by save and scoped delete

use shared::{ChangeSet, ConflictPolicy, RepositoryError, Result};
use tracing::{debug, warn};

use crate::context::{ReadContext, WriteContext};

/// Persist the context's pending changes and propagate them to the read side.
///
/// The main context is told about the commit before this returns, so a
/// caller awaiting the operation always observes its own writes there.
pub fn apply_changes(
    context: &mut dyn WriteContext,
    main: &dyn ReadContext,
    policy: ConflictPolicy,
) -> Result<ChangeSet> {
    context.set_conflict_policy(policy);

    if !context.has_changes() {
        debug!("commit skipped: no pending changes");
        return Err(RepositoryError::NoChanges);
    }

    let changes = context.save().map_err(|e| {
        warn!(error = %e, ?policy, "commit failed");
        RepositoryError::SaveFailed(e)
    })?;

    debug!(
        inserted = changes.inserted.len(),
        updated = changes.updated.len(),
        deleted = changes.deleted.len(),
        "commit succeeded"
    );
    main.merge_changes(changes.clone());
    Ok(changes)
}
