//! Predicate and ordering language for scoping queries, deletes and live results

use crate::record::Record;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Boolean filter over record fields
///
/// Missing fields read as `Value::Null`. String operators (`contains`,
/// `beginsWith`, `endsWith`, `like`, `matches`) are false on non-text values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    True,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    Contains(String, String),
    BeginsWith(String, String),
    EndsWith(String, String),
    /// Wildcard match: `*` any run, `?` one character
    Like(String, String),
    /// Full-string regular expression match
    Matches(String, String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lt(field.into(), value.into())
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Le(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gt(field.into(), value.into())
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Ge(field.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Predicate::IsNull(field.into())
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Predicate::Contains(field.into(), needle.into())
    }

    pub fn begins_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Predicate::BeginsWith(field.into(), prefix.into())
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Predicate::EndsWith(field.into(), suffix.into())
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like(field.into(), pattern.into())
    }

    pub fn matches(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Matches(field.into(), pattern.into())
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut all) => {
                all.push(other);
                Predicate::And(all)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut any) => {
                any.push(other);
                Predicate::Or(any)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    /// Evaluate against a record.
    ///
    /// Compiles `like`/`matches` patterns on every call; use [`compile`]
    /// when evaluating many records.
    ///
    /// [`compile`]: Predicate::compile
    pub fn evaluate(&self, record: &Record) -> bool {
        self.compile().evaluate(record)
    }

    /// Compile wildcard and regex patterns once for repeated evaluation
    pub fn compile(&self) -> CompiledPredicate<'_> {
        CompiledPredicate {
            root: Node::build(self),
        }
    }
}

/// A [`Predicate`] with its patterns compiled
///
/// Invalid patterns compile to "never matches".
#[derive(Debug)]
pub struct CompiledPredicate<'p> {
    root: Node<'p>,
}

impl CompiledPredicate<'_> {
    pub fn evaluate(&self, record: &Record) -> bool {
        self.root.evaluate(record)
    }
}

#[derive(Debug)]
enum Node<'p> {
    Leaf(&'p Predicate),
    Like(&'p str, Option<glob::Pattern>),
    Matches(&'p str, Option<regex::Regex>),
    And(Vec<Node<'p>>),
    Or(Vec<Node<'p>>),
    Not(Box<Node<'p>>),
}

impl<'p> Node<'p> {
    fn build(predicate: &'p Predicate) -> Self {
        match predicate {
            Predicate::Like(f, pattern) => Node::Like(f, glob::Pattern::new(pattern).ok()),
            Predicate::Matches(f, pattern) => Node::Matches(
                f,
                regex::Regex::new(&format!("^(?:{})$", pattern)).ok(),
            ),
            Predicate::And(all) => Node::And(all.iter().map(Node::build).collect()),
            Predicate::Or(any) => Node::Or(any.iter().map(Node::build).collect()),
            Predicate::Not(inner) => Node::Not(Box::new(Node::build(inner))),
            leaf => Node::Leaf(leaf),
        }
    }

    fn evaluate(&self, record: &Record) -> bool {
        match self {
            Node::Leaf(predicate) => leaf(predicate, record),
            Node::Like(f, pattern) => match (text(record, f), pattern) {
                (Some(s), Some(p)) => p.matches(s),
                _ => false,
            },
            Node::Matches(f, re) => match (text(record, f), re) {
                (Some(s), Some(re)) => re.is_match(s),
                _ => false,
            },
            Node::And(all) => all.iter().all(|n| n.evaluate(record)),
            Node::Or(any) => any.iter().any(|n| n.evaluate(record)),
            Node::Not(inner) => !inner.evaluate(record),
        }
    }
}

/// Operators without a pattern or sub-predicates
fn leaf(predicate: &Predicate, record: &Record) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::Eq(f, v) => record.get(f).loosely_eq(v),
        Predicate::Ne(f, v) => !record.get(f).loosely_eq(v),
        Predicate::Lt(f, v) => record.get(f).compare(v) == Some(Ordering::Less),
        Predicate::Le(f, v) => matches!(
            record.get(f).compare(v),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Predicate::Gt(f, v) => record.get(f).compare(v) == Some(Ordering::Greater),
        Predicate::Ge(f, v) => matches!(
            record.get(f).compare(v),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Predicate::In(f, values) => {
            let actual = record.get(f);
            values.iter().any(|v| actual.loosely_eq(v))
        }
        Predicate::IsNull(f) => record.get(f).is_null(),
        Predicate::Contains(f, needle) => {
            text(record, f).is_some_and(|s| s.contains(needle.as_str()))
        }
        Predicate::BeginsWith(f, prefix) => {
            text(record, f).is_some_and(|s| s.starts_with(prefix.as_str()))
        }
        Predicate::EndsWith(f, suffix) => {
            text(record, f).is_some_and(|s| s.ends_with(suffix.as_str()))
        }
        compound => compound.evaluate(record),
    }
}

impl std::ops::Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Not(Box::new(self))
    }
}

fn text<'r>(record: &'r Record, field: &str) -> Option<&'r str> {
    record.get_str(field)
}

/// One ordering key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub field: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl SortDescriptor {
    pub fn new(field: impl Into<String>, ascending: bool) -> Self {
        Self {
            field: field.into(),
            ascending,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, true)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, false)
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = a.get(&self.field).sort_cmp(b.get(&self.field));
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }
}

/// Compare two records by a sequence of sort descriptors
pub fn compare_records(ordering: &[SortDescriptor], a: &Record, b: &Record) -> Ordering {
    ordering
        .iter()
        .map(|s| s.compare(a, b))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Immutable predicate + ordering scoping a query, delete or live subscription
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    predicate: Option<Predicate>,
    #[serde(default)]
    ordering: Vec<SortDescriptor>,
}

impl SearchRequest {
    /// Match every record, unordered
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matching(predicate: Predicate) -> Self {
        Self {
            predicate: Some(predicate),
            ordering: Vec::new(),
        }
    }

    pub fn sorted_by(mut self, sort: SortDescriptor) -> Self {
        self.ordering.push(sort);
        self
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    pub fn ordering(&self) -> &[SortDescriptor] {
        &self.ordering
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicate.as_ref().map_or(true, |p| p.evaluate(record))
    }
}

/// Store-level fetch: one entity type, filtered, ordered and paged
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entity: String,
    pub predicate: Option<Predicate>,
    pub ordering: Vec<SortDescriptor>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl FetchRequest {
    /// Every record of `entity`
    pub fn all(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            ordering: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn from_search(entity: impl Into<String>, request: &SearchRequest) -> Self {
        Self {
            predicate: request.predicate().cloned(),
            ordering: request.ordering().to_vec(),
            ..Self::all(entity)
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Entity and predicate match
    pub fn matches(&self, record: &Record) -> bool {
        self.filter()(record)
    }

    /// Matching test with patterns compiled once, for scanning many records
    pub fn filter(&self) -> impl Fn(&Record) -> bool + '_ {
        let compiled = self.predicate.as_ref().map(Predicate::compile);
        move |record: &Record| {
            record.entity() == self.entity
                && compiled.as_ref().map_or(true, |p| p.evaluate(record))
        }
    }

    /// Filter, stable-sort and page candidate records.
    ///
    /// Candidates are expected in store insertion order; that order is kept
    /// for records the ordering does not distinguish.
    pub fn apply(&self, candidates: impl IntoIterator<Item = Record>) -> Vec<Record> {
        let matches = self.filter();
        let mut matched: Vec<Record> = candidates.into_iter().filter(|r| matches(r)).collect();
        if !self.ordering.is_empty() {
            matched.sort_by(|a, b| compare_records(&self.ordering, a, b));
        }
        let paged = matched.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => paged.take(limit).collect(),
            None => paged.collect(),
        }
    }
}
