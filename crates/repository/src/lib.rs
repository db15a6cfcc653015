//! # repokit Repository
//!
//! Generic repository engine between application code and a local object
//! store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Repository Layer (This Crate)                    │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │  mapper      - EntityMapper: domain value <-> Record        ││
//! │  │  context     - Store ports (main read / background write)   ││
//! │  │  repository/ - Repository trait + StoreRepository engine    ││
//! │  │  live        - Auto-updating result sets                    ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine knows nothing about a concrete store. Anything that implements
//! [`StoreContextSource`] can sit behind it; `store-memory` is the in-process
//! one.

pub mod context;
pub mod live;
pub mod mapper;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use context::{
    BackgroundTask, BatchDeleteResult, BatchResultType, ReadContext, StoreContextSource,
    WriteContext,
};
pub use live::LiveResults;
pub use mapper::EntityMapper;
pub use repository::{store_repository::StoreRepository, Repository};
