//! Entity Mapper - translation between domain values and stored records
//!
//! One mapper per entity type. The repository never looks at domain fields
//! itself; everything goes through these methods.

use shared::{Predicate, Record};

/// Translator between a domain model and its stored [`Record`]
///
/// # Key contract
///
/// For any record `r` updated from model `m`, `record_key(r) == model_key(m)`
/// must hold once `update(r, m)` returns, and `model_key(convert(r)) ==
/// record_key(r)` for every convertible record. Upsert reconciliation relies
/// on it; a mapper that breaks it produces duplicate records.
pub trait EntityMapper: Send + Sync + 'static {
    type Model: Clone + Send + Sync + 'static;

    /// Stored entity type this mapper reads and writes
    fn entity_name(&self) -> &str;

    /// Build a domain model, `None` if the record is malformed
    fn convert(&self, record: &Record) -> Option<Self::Model>;

    /// Copy domain fields onto the record in place
    fn update(&self, record: &mut Record, model: &Self::Model);

    fn record_key(&self, record: &Record) -> String;

    fn model_key(&self, model: &Self::Model) -> String;

    /// Predicate selecting the records whose key is one of `keys`.
    ///
    /// Mappers whose key is a plain field can return
    /// `Some(Predicate::is_in(field, keys))`; that enables chunked
    /// reconciliation on save. The default keeps the full-table load.
    fn key_predicate(&self, _keys: &[String]) -> Option<Predicate> {
        None
    }
}
