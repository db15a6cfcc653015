//! Store-native records and change sets

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Store-internal identity of a record
///
/// Distinct from the application's accessor key: two records can never share
/// a `RecordId`, but the store does not know anything about accessor keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Allocate a fresh identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored entity instance: identity, entity name, field values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    entity: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record with a fresh identity
    pub fn new(entity: impl Into<String>) -> Self {
        Self::with_id(RecordId::new(), entity)
    }

    pub fn with_id(id: RecordId, entity: impl Into<String>) -> Self {
        Self {
            id,
            entity: entity.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Field value, `Value::Null` when unset
    pub fn get(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).as_str()
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).as_bool()
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).as_i64()
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).as_f64()
    }

    /// Set a field. Setting `Value::Null` removes it.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        match value.into() {
            Value::Null => {
                self.fields.remove(&field);
            }
            value => {
                self.fields.insert(field, value);
            }
        }
    }

    /// Builder-style `set`
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Names of fields whose values differ between `self` and `other`
    pub fn changed_fields(&self, other: &Record) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .keys()
            .chain(other.fields.keys())
            .filter(|name| self.get(name) != other.get(name))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Reference to a record in a change set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub id: RecordId,
    pub entity: String,
}

impl RecordRef {
    pub fn new(id: RecordId, entity: impl Into<String>) -> Self {
        Self {
            id,
            entity: entity.into(),
        }
    }

    pub fn of(record: &Record) -> Self {
        Self::new(record.id(), record.entity())
    }
}

/// What a commit (or batch operation) did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub inserted: Vec<RecordRef>,
    pub updated: Vec<RecordRef>,
    pub deleted: Vec<RecordRef>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change set describing a batch deletion
    pub fn deleted(entity: &str, ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            deleted: ids.into_iter().map(|id| RecordRef::new(id, entity)).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    /// Whether any change concerns records of `entity`
    pub fn touches(&self, entity: &str) -> bool {
        self.inserted
            .iter()
            .chain(&self.updated)
            .chain(&self.deleted)
            .any(|r| r.entity == entity)
    }
}
