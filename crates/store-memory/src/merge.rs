//! Field-level conflict resolution
//!
//! Three versions of a record meet at commit time:
//!
//! ```text
//! base      what the write context first read
//! incoming  what the write context wants to persist
//! stored    what is committed now (changed by someone else since `base`)
//! ```
//!
//! "Ours" are the fields where `incoming` differs from `base`, "theirs" the
//! fields where `stored` differs from `base`.

use std::collections::HashSet;

use shared::{ConflictPolicy, Record, StoreError};

/// Merge `incoming` onto a concurrently changed `stored` record
pub(crate) fn resolve(
    base: &Record,
    incoming: &Record,
    stored: &Record,
    policy: ConflictPolicy,
) -> Result<Record, StoreError> {
    let ours = base.changed_fields(incoming);
    let theirs: HashSet<String> = base.changed_fields(stored).into_iter().collect();

    let mut merged = stored.clone();
    match policy {
        ConflictPolicy::Reject => {
            let mut fields: Vec<String> = ours.into_iter().chain(theirs).collect();
            fields.sort();
            fields.dedup();
            return Err(StoreError::Conflict {
                id: stored.id(),
                fields,
            });
        }
        ConflictPolicy::IncomingWins => {
            for field in &ours {
                merged.set(field.as_str(), incoming.get(field).clone());
            }
        }
        ConflictPolicy::ExistingWins => {
            for field in ours.iter().filter(|f| !theirs.contains(*f)) {
                merged.set(field.as_str(), incoming.get(field).clone());
            }
        }
    }
    Ok(merged)
}
