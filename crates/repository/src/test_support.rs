//! Test doubles for the context ports

use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::{
    ChangeSet, ConflictPolicy, FetchRequest, Predicate, Record, RecordId, RecordRef, StoreError,
};
use tokio::sync::broadcast;

use crate::context::{
    BackgroundTask, BatchDeleteResult, BatchResultType, ReadContext, StoreContextSource,
    WriteContext,
};
use crate::mapper::EntityMapper;

#[derive(Debug, Clone, PartialEq)]
pub struct Todo {
    pub id: String,
    pub title: String,
    pub done: bool,
}

pub struct TodoMapper;

impl EntityMapper for TodoMapper {
    type Model = Todo;

    fn entity_name(&self) -> &str {
        "Todo"
    }

    fn convert(&self, record: &Record) -> Option<Todo> {
        Some(Todo {
            id: record.get_str("id")?.to_string(),
            title: record.get_str("title")?.to_string(),
            done: record.get_bool("isCompleted").unwrap_or(false),
        })
    }

    fn update(&self, record: &mut Record, model: &Todo) {
        record.set("id", model.id.as_str());
        record.set("title", model.title.as_str());
        record.set("isCompleted", model.done);
    }

    fn record_key(&self, record: &Record) -> String {
        record.get_str("id").unwrap_or_default().to_string()
    }

    fn model_key(&self, model: &Todo) -> String {
        model.id.clone()
    }
}

/// Same as `TodoMapper`, with chunked reconciliation enabled
pub struct KeyedTodoMapper;

impl EntityMapper for KeyedTodoMapper {
    type Model = Todo;

    fn entity_name(&self) -> &str {
        TodoMapper.entity_name()
    }

    fn convert(&self, record: &Record) -> Option<Todo> {
        TodoMapper.convert(record)
    }

    fn update(&self, record: &mut Record, model: &Todo) {
        TodoMapper.update(record, model)
    }

    fn record_key(&self, record: &Record) -> String {
        TodoMapper.record_key(record)
    }

    fn model_key(&self, model: &Todo) -> String {
        TodoMapper.model_key(model)
    }

    fn key_predicate(&self, keys: &[String]) -> Option<Predicate> {
        Some(Predicate::is_in("id", keys.iter().map(String::as_str)))
    }
}

/// Single-threaded write context over a plain vector
#[derive(Default)]
pub struct FakeContext {
    pub records: Vec<Record>,
    pub staged: Vec<Record>,
    pub deleted: Vec<RecordId>,
    pub policy: ConflictPolicy,
    pub fail_save: Option<StoreError>,
    pub fail_fetch: Option<StoreError>,
    /// Report this result type from batch deletes regardless of the request
    pub batch_reports: Option<BatchResultType>,
    pub fetches: usize,
}

impl FakeContext {
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn stage_for_test(&mut self, record: Record) {
        self.stage(record);
    }

    fn visible(&self) -> Vec<Record> {
        let mut visible: Vec<Record> = self
            .records
            .iter()
            .filter(|r| !self.deleted.contains(&r.id()))
            .map(|r| {
                self.staged
                    .iter()
                    .find(|s| s.id() == r.id())
                    .cloned()
                    .unwrap_or_else(|| r.clone())
            })
            .collect();
        visible.extend(
            self.staged
                .iter()
                .filter(|s| !self.records.iter().any(|r| r.id() == s.id()))
                .cloned(),
        );
        visible
    }
}

impl WriteContext for FakeContext {
    fn fetch(&mut self, request: &FetchRequest) -> Result<Vec<Record>, StoreError> {
        self.fetches += 1;
        if let Some(err) = &self.fail_fetch {
            return Err(err.clone());
        }
        Ok(request.apply(self.visible()))
    }

    fn fetch_ids(&mut self, request: &FetchRequest) -> Result<Vec<RecordId>, StoreError> {
        Ok(self.fetch(request)?.iter().map(Record::id).collect())
    }

    fn new_record(&mut self, entity: &str) -> Record {
        Record::new(entity)
    }

    fn stage(&mut self, record: Record) {
        match self.staged.iter_mut().find(|s| s.id() == record.id()) {
            Some(slot) => *slot = record,
            None => self.staged.push(record),
        }
    }

    fn delete(&mut self, id: RecordId) {
        self.staged.retain(|s| s.id() != id);
        if self.records.iter().any(|r| r.id() == id) {
            self.deleted.push(id);
        }
    }

    fn has_changes(&self) -> bool {
        !self.staged.is_empty() || !self.deleted.is_empty()
    }

    fn set_conflict_policy(&mut self, policy: ConflictPolicy) {
        self.policy = policy;
    }

    fn save(&mut self) -> Result<ChangeSet, StoreError> {
        if let Some(err) = &self.fail_save {
            return Err(err.clone());
        }
        let mut changes = ChangeSet::new();
        for id in self.deleted.drain(..) {
            if let Some(pos) = self.records.iter().position(|r| r.id() == id) {
                let removed = self.records.remove(pos);
                changes.deleted.push(RecordRef::of(&removed));
            }
        }
        for record in self.staged.drain(..) {
            match self.records.iter_mut().find(|r| r.id() == record.id()) {
                Some(slot) => {
                    changes.updated.push(RecordRef::of(&record));
                    *slot = record;
                }
                None => {
                    changes.inserted.push(RecordRef::of(&record));
                    self.records.push(record);
                }
            }
        }
        Ok(changes)
    }

    fn execute_batch_delete(
        &mut self,
        request: &FetchRequest,
        result_type: BatchResultType,
    ) -> Result<BatchDeleteResult, StoreError> {
        let ids: Vec<RecordId> = self
            .records
            .iter()
            .filter(|r| request.matches(r))
            .map(Record::id)
            .collect();
        self.records.retain(|r| !ids.contains(&r.id()));
        Ok(match self.batch_reports.unwrap_or(result_type) {
            BatchResultType::StatusOnly => BatchDeleteResult::Status(true),
            BatchResultType::Count => BatchDeleteResult::Count(ids.len()),
            BatchResultType::ObjectIds => BatchDeleteResult::ObjectIds(ids),
        })
    }
}

/// Main context that records what was merged into it
pub struct RecordingMain {
    records: Mutex<Vec<Record>>,
    merged: Mutex<Vec<ChangeSet>>,
    sender: broadcast::Sender<ChangeSet>,
    fetch_delay: Mutex<Option<Duration>>,
}

impl Default for RecordingMain {
    fn default() -> Self {
        Self::with_records(Vec::new())
    }
}

impl RecordingMain {
    pub fn with_records(records: Vec<Record>) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            records: Mutex::new(records),
            merged: Mutex::new(Vec::new()),
            sender,
            fetch_delay: Mutex::new(None),
        }
    }

    pub fn insert_for_test(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }

    pub fn merged(&self) -> Vec<ChangeSet> {
        self.merged.lock().unwrap().clone()
    }

    /// Make every later fetch block the calling thread for `delay`
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }
}

impl ReadContext for RecordingMain {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Record>, StoreError> {
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(request.apply(self.records.lock().unwrap().clone()))
    }

    fn merge_changes(&self, changes: ChangeSet) {
        self.merged.lock().unwrap().push(changes.clone());
        let _ = self.sender.send(changes);
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.sender.subscribe()
    }
}

/// Runs tasks inline against one shared `FakeContext`
pub struct InlineSource {
    pub main: Arc<RecordingMain>,
    pub context: Mutex<FakeContext>,
    pub drop_tasks: bool,
}

impl InlineSource {
    pub fn new(context: FakeContext) -> Self {
        Self {
            main: Arc::new(RecordingMain::default()),
            context: Mutex::new(context),
            drop_tasks: false,
        }
    }
}

impl StoreContextSource for InlineSource {
    fn main_context(&self) -> Arc<dyn ReadContext> {
        self.main.clone()
    }

    fn run_background_task(&self, task: BackgroundTask) {
        if self.drop_tasks {
            return;
        }
        let mut context = self.context.lock().unwrap();
        task(&mut *context);
    }
}
