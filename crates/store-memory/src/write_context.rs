//! Background write context
//!
//! Changes are buffered here until `save`. The context remembers the version
//! of every committed record it handed out; if the store's version moved on
//! by the time of `save`, the record is merged according to the conflict
//! policy instead of being blindly overwritten.

use std::collections::{HashMap, HashSet};

use repository::{BatchDeleteResult, BatchResultType, WriteContext};
use shared::{ChangeSet, ConflictPolicy, FetchRequest, Record, RecordId, RecordRef, StoreError};
use tracing::{debug, info};

use crate::merge::resolve;
use crate::store::{MemoryStore, StoreState};

/// Committed state as this context first saw it
#[derive(Debug, Clone)]
struct Snapshot {
    version: u64,
    record: Record,
}

/// What `save` will do to one record, decided before anything is written
enum Planned {
    Insert(Record),
    Replace(Record),
    Delete(RecordId),
}

#[derive(Debug)]
pub struct MemoryWriteContext {
    store: MemoryStore,
    policy: ConflictPolicy,
    snapshots: HashMap<RecordId, Snapshot>,
    pending: HashMap<RecordId, Record>,
    /// Pending records that do not exist in the store, in staging order
    inserts: Vec<RecordId>,
    inserted: HashSet<RecordId>,
    deletes: HashSet<RecordId>,
}

impl MemoryWriteContext {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            policy: ConflictPolicy::default(),
            snapshots: HashMap::new(),
            pending: HashMap::new(),
            inserts: Vec::new(),
            inserted: HashSet::new(),
            deletes: HashSet::new(),
        }
    }

    /// Records as this context sees them: committed, overlaid with pending
    /// edits, minus pending deletes, plus pending inserts
    fn visible(&self, state: &StoreState, entity: &str) -> Vec<Record> {
        let committed = state
            .records()
            .filter(|stored| stored.record.entity() == entity)
            .filter(|stored| !self.deletes.contains(&stored.record.id()))
            .map(|stored| {
                self.pending
                    .get(&stored.record.id())
                    .cloned()
                    .unwrap_or_else(|| stored.record.clone())
            });
        let inserted = self
            .inserts
            .iter()
            .filter_map(|id| self.pending.get(id))
            .filter(|record| record.entity() == entity)
            .cloned();
        committed.chain(inserted).collect()
    }

    fn is_insert(&self, id: &RecordId) -> bool {
        self.inserted.contains(id)
    }

    fn plan(&self, state: &StoreState) -> Result<Vec<Planned>, StoreError> {
        let mut plan = Vec::with_capacity(self.pending.len() + self.deletes.len());

        for id in &self.deletes {
            if state.get(id).is_some() {
                plan.push(Planned::Delete(*id));
            }
        }

        for (id, incoming) in &self.pending {
            if self.is_insert(id) {
                continue;
            }
            let Some(snapshot) = self.snapshots.get(id) else {
                return Err(StoreError::UnknownRecord(*id));
            };
            match state.get(id) {
                Some(stored) if stored.version == snapshot.version => {
                    plan.push(Planned::Replace(incoming.clone()));
                }
                Some(stored) => {
                    debug!(record = %id, policy = ?self.policy, "resolving merge conflict");
                    let merged = resolve(&snapshot.record, incoming, &stored.record, self.policy)?;
                    // Every field we touched lost the merge: nothing to write
                    if merged != stored.record {
                        plan.push(Planned::Replace(merged));
                    }
                }
                // Deleted by someone else since we read it
                None => match self.policy {
                    ConflictPolicy::IncomingWins => plan.push(Planned::Insert(incoming.clone())),
                    ConflictPolicy::ExistingWins => {}
                    ConflictPolicy::Reject => {
                        return Err(StoreError::Conflict {
                            id: *id,
                            fields: snapshot.record.changed_fields(incoming),
                        })
                    }
                },
            }
        }

        for id in &self.inserts {
            if let Some(record) = self.pending.get(id) {
                plan.push(Planned::Insert(record.clone()));
            }
        }
        Ok(plan)
    }

    fn reset(&mut self) {
        self.snapshots.clear();
        self.pending.clear();
        self.inserts.clear();
        self.inserted.clear();
        self.deletes.clear();
    }
}

impl WriteContext for MemoryWriteContext {
    fn fetch(&mut self, request: &FetchRequest) -> Result<Vec<Record>, StoreError> {
        let state = self.store.read()?;
        let records = request.apply(self.visible(&state, &request.entity));
        for record in &records {
            if self.snapshots.contains_key(&record.id()) {
                continue;
            }
            if let Some(stored) = state.get(&record.id()) {
                self.snapshots.insert(
                    record.id(),
                    Snapshot {
                        version: stored.version,
                        record: stored.record.clone(),
                    },
                );
            }
        }
        Ok(records)
    }

    fn fetch_ids(&mut self, request: &FetchRequest) -> Result<Vec<RecordId>, StoreError> {
        let state = self.store.read()?;
        Ok(request
            .apply(self.visible(&state, &request.entity))
            .iter()
            .map(Record::id)
            .collect())
    }

    fn new_record(&mut self, entity: &str) -> Record {
        Record::new(entity)
    }

    fn stage(&mut self, record: Record) {
        let id = record.id();
        self.deletes.remove(&id);

        if self.is_insert(&id) {
            self.pending.insert(id, record);
            return;
        }

        if !self.snapshots.contains_key(&id) {
            // Never fetched through this context: snapshot the committed
            // version now, or treat it as a new record
            let committed = self
                .store
                .read()
                .ok()
                .and_then(|state| state.get(&id).cloned());
            match committed {
                Some(stored) => {
                    self.snapshots.insert(
                        id,
                        Snapshot {
                            version: stored.version,
                            record: stored.record,
                        },
                    );
                }
                None => {
                    self.inserts.push(id);
                    self.inserted.insert(id);
                    self.pending.insert(id, record);
                    return;
                }
            }
        }

        let unchanged = self
            .snapshots
            .get(&id)
            .is_some_and(|snapshot| snapshot.record == record);
        if unchanged {
            self.pending.remove(&id);
        } else {
            self.pending.insert(id, record);
        }
    }

    fn delete(&mut self, id: RecordId) {
        if self.is_insert(&id) {
            self.inserted.remove(&id);
            self.inserts.retain(|pending| *pending != id);
            self.pending.remove(&id);
            return;
        }
        self.pending.remove(&id);
        self.deletes.insert(id);
    }

    fn has_changes(&self) -> bool {
        !self.pending.is_empty() || !self.deletes.is_empty()
    }

    fn set_conflict_policy(&mut self, policy: ConflictPolicy) {
        self.policy = policy;
    }

    fn save(&mut self) -> Result<ChangeSet, StoreError> {
        let mut changes = ChangeSet::new();
        {
            let mut state = self.store.write()?;
            // Plan first so a rejected conflict leaves the store untouched
            let plan = self.plan(&state)?;

            for step in plan {
                match step {
                    Planned::Delete(id) => {
                        if let Some(removed) = state.remove(&id) {
                            changes.deleted.push(RecordRef::of(&removed.record));
                        }
                    }
                    Planned::Replace(record) => {
                        changes.updated.push(RecordRef::of(&record));
                        state.replace(record)?;
                    }
                    Planned::Insert(record) => {
                        changes.inserted.push(RecordRef::of(&record));
                        state.insert(record);
                    }
                }
            }
        }

        debug!(
            inserted = changes.inserted.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            "write context saved"
        );
        self.reset();
        Ok(changes)
    }

    fn execute_batch_delete(
        &mut self,
        request: &FetchRequest,
        result_type: BatchResultType,
    ) -> Result<BatchDeleteResult, StoreError> {
        let matches = request.filter();
        let mut state = self.store.write()?;
        let ids: Vec<RecordId> = state
            .records()
            .filter(|stored| matches(&stored.record))
            .map(|stored| stored.record.id())
            .collect();
        for id in &ids {
            state.remove(id);
        }
        info!(entity = %request.entity, deleted = ids.len(), "batch delete");

        Ok(match result_type {
            BatchResultType::StatusOnly => BatchDeleteResult::Status(true),
            BatchResultType::Count => BatchDeleteResult::Count(ids.len()),
            BatchResultType::ObjectIds => BatchDeleteResult::ObjectIds(ids),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(store: &MemoryStore, records: Vec<Record>) {
        let mut context = MemoryWriteContext::new(store.clone());
        for record in records {
            context.stage(record);
        }
        context.save().unwrap();
    }

    fn todo(id: &str, title: &str) -> Record {
        Record::new("Todo").with("id", id).with("title", title)
    }

    #[test]
    fn test_insert_and_fetch_sees_pending() {
        let store = MemoryStore::new();
        let mut context = MemoryWriteContext::new(store.clone());

        let record = context.new_record("Todo").with("id", "1");
        assert!(!context.has_changes());
        context.stage(record);
        assert!(context.has_changes());

        // Visible to this context before save, not to the store
        assert_eq!(context.fetch(&FetchRequest::all("Todo")).unwrap().len(), 1);
        assert_eq!(store.count("Todo").unwrap(), 0);

        let changes = context.save().unwrap();
        assert_eq!(changes.inserted.len(), 1);
        assert_eq!(store.count("Todo").unwrap(), 1);
        assert!(!context.has_changes());
    }

    #[test]
    fn test_restaging_identical_values_is_not_a_change() {
        let store = MemoryStore::new();
        seeded(&store, vec![todo("1", "a")]);

        let mut context = MemoryWriteContext::new(store);
        let fetched = context.fetch(&FetchRequest::all("Todo")).unwrap();
        context.stage(fetched[0].clone());
        assert!(!context.has_changes());
    }

    #[test]
    fn test_pending_delete_hides_record() {
        let store = MemoryStore::new();
        seeded(&store, vec![todo("1", "a"), todo("2", "b")]);

        let mut context = MemoryWriteContext::new(store.clone());
        let ids = context.fetch_ids(&FetchRequest::all("Todo")).unwrap();
        context.delete(ids[0]);

        let visible = context.fetch(&FetchRequest::all("Todo")).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].get_str("id"), Some("2"));

        let changes = context.save().unwrap();
        assert_eq!(changes.deleted.len(), 1);
        assert_eq!(store.count("Todo").unwrap(), 1);
    }

    #[test]
    fn test_deleting_pending_insert_cancels_it() {
        let mut context = MemoryWriteContext::new(MemoryStore::new());
        let record = context.new_record("Todo");
        let id = record.id();
        context.stage(record);
        context.delete(id);
        assert!(!context.has_changes());
    }

    fn conflicting_update(policy: ConflictPolicy) -> (MemoryStore, RecordId, Result<ChangeSet, StoreError>) {
        let store = MemoryStore::new();
        seeded(&store, vec![todo("1", "a").with("notes", "n")]);

        let mut ours = MemoryWriteContext::new(store.clone());
        let mut theirs = MemoryWriteContext::new(store.clone());
        let mut mine = ours.fetch(&FetchRequest::all("Todo")).unwrap().remove(0);
        let mut other = theirs.fetch(&FetchRequest::all("Todo")).unwrap().remove(0);

        other.set("title", "theirs");
        other.set("notes", "m");
        theirs.stage(other);
        theirs.save().unwrap();

        mine.set("title", "ours");
        let id = mine.id();
        ours.stage(mine);
        ours.set_conflict_policy(policy);
        let outcome = ours.save();
        (store, id, outcome)
    }

    #[test]
    fn test_conflict_incoming_wins() {
        let (store, id, outcome) = conflicting_update(ConflictPolicy::IncomingWins);
        assert_eq!(outcome.unwrap().updated.len(), 1);

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.get_str("title"), Some("ours"));
        assert_eq!(record.get_str("notes"), Some("m"));
        assert_eq!(store.version(&id).unwrap(), Some(3));
    }

    #[test]
    fn test_conflict_existing_wins() {
        let (store, id, outcome) = conflicting_update(ConflictPolicy::ExistingWins);
        assert!(outcome.is_ok());

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.get_str("title"), Some("theirs"));
        assert_eq!(record.get_str("notes"), Some("m"));
    }

    #[test]
    fn test_existing_wins_without_surviving_fields_writes_nothing() {
        let (store, id, outcome) = conflicting_update(ConflictPolicy::ExistingWins);

        let changes = outcome.unwrap();
        assert!(changes.is_empty());
        assert_eq!(store.version(&id).unwrap(), Some(2));
    }

    #[test]
    fn test_conflict_reject_leaves_store_untouched() {
        let (store, id, outcome) = conflicting_update(ConflictPolicy::Reject);
        assert!(matches!(outcome, Err(StoreError::Conflict { .. })));

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.get_str("title"), Some("theirs"));
        assert_eq!(store.version(&id).unwrap(), Some(2));
    }

    #[test]
    fn test_update_of_concurrently_deleted_record() {
        for (policy, survives) in [
            (ConflictPolicy::IncomingWins, true),
            (ConflictPolicy::ExistingWins, false),
        ] {
            let store = MemoryStore::new();
            seeded(&store, vec![todo("1", "a")]);

            let mut ours = MemoryWriteContext::new(store.clone());
            let mut record = ours.fetch(&FetchRequest::all("Todo")).unwrap().remove(0);

            let mut eraser = MemoryWriteContext::new(store.clone());
            eraser
                .execute_batch_delete(&FetchRequest::all("Todo"), BatchResultType::Count)
                .unwrap();

            record.set("title", "b");
            ours.stage(record);
            ours.set_conflict_policy(policy);
            ours.save().unwrap();

            assert_eq!(store.count("Todo").unwrap() == 1, survives, "{:?}", policy);
        }
    }

    #[test]
    fn test_batch_delete_result_types() {
        let store = MemoryStore::new();
        seeded(&store, vec![todo("1", "a"), todo("2", "b")]);
        seeded(&store, vec![Record::new("Note").with("id", "n")]);

        let mut context = MemoryWriteContext::new(store.clone());
        let result = context
            .execute_batch_delete(&FetchRequest::all("Todo"), BatchResultType::ObjectIds)
            .unwrap();
        match result {
            BatchDeleteResult::ObjectIds(ids) => assert_eq!(ids.len(), 2),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(store.count("Todo").unwrap(), 0);
        assert_eq!(store.count("Note").unwrap(), 1);

        let result = context
            .execute_batch_delete(&FetchRequest::all("Note"), BatchResultType::Count)
            .unwrap();
        assert_eq!(result, BatchDeleteResult::Count(1));
    }
}
