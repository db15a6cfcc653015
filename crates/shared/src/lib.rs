//! # repokit Shared
//!
//! Store-agnostic vocabulary used by every repokit crate: field values,
//! records and change sets, the predicate/ordering language, errors and
//! configuration.

pub mod config;
pub mod error;
pub mod record;
pub mod search;
pub mod value;

// Re-exports
pub use config::*;
pub use error::*;
pub use record::*;
pub use search::*;
pub use value::*;
