//! Upsert-by-key reconciliation
//!
//! Existing records are loaded once and indexed by accessor key, so a save
//! costs O(existing + incoming) instead of one lookup per object. With a
//! batch size and a mapper that can express "key in [..]" as a predicate,
//! the index is built per chunk of input instead of for the whole table.

use std::collections::{HashMap, HashSet};

use shared::{FetchRequest, Predicate, Record, StoreError};
use tracing::debug;

use crate::context::WriteContext;
use crate::mapper::EntityMapper;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub inserted: usize,
    pub updated: usize,
    /// Objects whose key already occurred earlier in the same save
    pub collapsed: usize,
}

impl ReconcileStats {
    fn add(&mut self, other: ReconcileStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.collapsed += other.collapsed;
    }
}

/// Stage every object onto a matching or freshly allocated record
pub fn reconcile<M: EntityMapper>(
    context: &mut dyn WriteContext,
    mapper: &M,
    objects: &[M::Model],
    batch_size: Option<usize>,
) -> Result<ReconcileStats, StoreError> {
    if let Some(size) = batch_size.filter(|s| *s > 0) {
        if let Some(chunks) = keyed_chunks(mapper, objects, size) {
            debug!(entity = mapper.entity_name(), chunks = chunks.len(), "chunked reconciliation");
            let mut stats = ReconcileStats::default();
            let mut seen = HashSet::new();
            for (chunk, predicate) in chunks {
                let request = FetchRequest::all(mapper.entity_name()).with_predicate(predicate);
                let existing = context.fetch(&request)?;
                stats.add(upsert(context, mapper, existing, chunk, &mut seen));
            }
            return Ok(stats);
        }
    }

    let existing = context.fetch(&FetchRequest::all(mapper.entity_name()))?;
    Ok(upsert(context, mapper, existing, objects, &mut HashSet::new()))
}

fn keyed_chunks<'a, M: EntityMapper>(
    mapper: &M,
    objects: &'a [M::Model],
    size: usize,
) -> Option<Vec<(&'a [M::Model], Predicate)>> {
    objects
        .chunks(size)
        .map(|chunk| {
            let keys: Vec<String> = chunk.iter().map(|m| mapper.model_key(m)).collect();
            mapper.key_predicate(&keys).map(|p| (chunk, p))
        })
        .collect()
}

fn upsert<M: EntityMapper>(
    context: &mut dyn WriteContext,
    mapper: &M,
    existing: Vec<Record>,
    objects: &[M::Model],
    seen: &mut HashSet<String>,
) -> ReconcileStats {
    let mut by_key: HashMap<String, Record> = existing
        .into_iter()
        .map(|r| (mapper.record_key(&r), r))
        .collect();
    // First-touch order, so staging follows input order
    let mut touched: Vec<String> = Vec::new();
    let mut staged: HashSet<String> = HashSet::new();
    let mut stats = ReconcileStats::default();

    for model in objects {
        let key = mapper.model_key(model);
        if seen.contains(&key) {
            stats.collapsed += 1;
        } else if by_key.contains_key(&key) {
            stats.updated += 1;
        } else {
            stats.inserted += 1;
        }
        if !by_key.contains_key(&key) {
            let fresh = context.new_record(mapper.entity_name());
            by_key.insert(key.clone(), fresh);
        }
        if let Some(record) = by_key.get_mut(&key) {
            mapper.update(record, model);
        }
        seen.insert(key.clone());
        if staged.insert(key.clone()) {
            touched.push(key);
        }
    }

    for key in touched {
        if let Some(record) = by_key.remove(&key) {
            context.stage(record);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeContext, KeyedTodoMapper, Todo, TodoMapper};

    fn todo(id: &str, title: &str) -> Todo {
        Todo {
            id: id.into(),
            title: title.into(),
            done: false,
        }
    }

    fn stored(id: &str, title: &str) -> Record {
        Record::new("Todo").with("id", id).with("title", title)
    }

    #[test]
    fn test_updates_existing_and_inserts_new() {
        let existing = stored("1", "old");
        let existing_id = existing.id();
        let mut context = FakeContext::with_records(vec![existing]);

        let stats = reconcile(
            &mut context,
            &TodoMapper,
            &[todo("1", "new"), todo("2", "second")],
            None,
        )
        .unwrap();

        assert_eq!(
            stats,
            ReconcileStats {
                inserted: 1,
                updated: 1,
                collapsed: 0
            }
        );
        assert_eq!(context.staged.len(), 2);
        assert_eq!(context.staged[0].id(), existing_id);
        assert_eq!(context.staged[0].get_str("title"), Some("new"));
        assert_eq!(context.staged[1].get_str("id"), Some("2"));
    }

    #[test]
    fn test_duplicate_keys_collapse_onto_one_record() {
        let mut context = FakeContext::default();

        let stats = reconcile(
            &mut context,
            &TodoMapper,
            &[todo("7", "first"), todo("7", "last")],
            None,
        )
        .unwrap();

        assert_eq!(
            stats,
            ReconcileStats {
                inserted: 1,
                updated: 0,
                collapsed: 1
            }
        );
        assert_eq!(context.staged.len(), 1);
        assert_eq!(context.staged[0].get_str("title"), Some("last"));
    }

    #[test]
    fn test_chunked_matches_full_table() {
        let input: Vec<Todo> = (0..10).map(|i| todo(&i.to_string(), "t")).collect();
        let existing: Vec<Record> = (0..10)
            .step_by(2)
            .map(|i| stored(&i.to_string(), "old"))
            .collect();

        let mut full = FakeContext::with_records(existing.clone());
        let full_stats = reconcile(&mut full, &KeyedTodoMapper, &input, None).unwrap();

        let mut chunked = FakeContext::with_records(existing);
        let chunked_stats = reconcile(&mut chunked, &KeyedTodoMapper, &input, Some(3)).unwrap();

        assert_eq!(full_stats, chunked_stats);
        assert_eq!(
            chunked_stats,
            ReconcileStats {
                inserted: 5,
                updated: 5,
                collapsed: 0
            }
        );
        // Full path reads once, chunked path reads once per chunk
        assert_eq!(full.fetches, 1);
        assert_eq!(chunked.fetches, 4);
    }

    #[test]
    fn test_duplicates_across_chunks_collapse() {
        let input = [
            todo("1", "a"),
            todo("2", "b"),
            todo("3", "c"),
            todo("1", "a2"),
        ];

        let mut full = FakeContext::default();
        let full_stats = reconcile(&mut full, &KeyedTodoMapper, &input, None).unwrap();

        let mut chunked = FakeContext::default();
        let chunked_stats = reconcile(&mut chunked, &KeyedTodoMapper, &input, Some(3)).unwrap();

        assert_eq!(full_stats, chunked_stats);
        assert_eq!(chunked_stats.inserted, 3);
        assert_eq!(chunked_stats.collapsed, 1);
        assert_eq!(chunked.staged.len(), 3);
        assert_eq!(chunked.staged[0].get_str("title"), Some("a2"));
    }

    #[test]
    fn test_batch_size_without_key_predicate_loads_full_table() {
        let mut context = FakeContext::default();
        reconcile(&mut context, &TodoMapper, &[todo("1", "a"), todo("2", "b")], Some(1)).unwrap();
        assert_eq!(context.fetches, 1);
    }

    #[test]
    fn test_fetch_failure_propagates() {
        let mut context = FakeContext {
            fail_fetch: Some(StoreError::Unavailable("gone".into())),
            ..FakeContext::default()
        };
        let err = reconcile(&mut context, &TodoMapper, &[todo("1", "a")], None).unwrap_err();
        assert_eq!(err, StoreError::Unavailable("gone".into()));
    }
}
