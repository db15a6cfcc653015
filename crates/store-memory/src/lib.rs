//! # repokit Memory Store
//!
//! In-process store adapter for the repository engine.
//!
//! ## Structure
//!
//! - `store` - Committed records with per-record versions
//! - `main_context` - Shared read context and change notifications
//! - `write_context` - Isolated pending changes with conflict merge on save
//! - `source` - Hands out the contexts to `StoreRepository`
//!
//! ```no_run
//! use std::sync::Arc;
//! use store_memory::InMemoryContextSource;
//!
//! let source = Arc::new(InMemoryContextSource::new());
//! // StoreRepository::new(source, mapper, None)
//! # let _ = source;
//! ```

mod merge;

pub mod main_context;
pub mod source;
pub mod store;
pub mod write_context;

pub use main_context::MainContext;
pub use source::InMemoryContextSource;
pub use store::MemoryStore;
pub use write_context::MemoryWriteContext;
