//! Repository - the capability set application code programs against
//!
//! One trait, one implementation per storage backend. `StoreRepository`
//! is the implementation for anything behind a [`StoreContextSource`].
//!
//! [`StoreContextSource`]: crate::context::StoreContextSource

pub mod commit;
pub mod projection;
pub mod reconcile;
pub mod store_repository;

use async_trait::async_trait;
use shared::{Result, SearchRequest};

use crate::live::LiveResults;

/// Bulk upsert, query, scoped delete and erase over one entity type
///
/// Every operation runs on its own background task. Operations are not
/// serialized against each other: overlapping saves on the same keys are
/// last-commit-wins.
#[async_trait]
pub trait Repository: Send + Sync {
    type Model: Clone + Send + Sync + 'static;

    /// Insert or update by accessor key
    async fn save(&self, objects: Vec<Self::Model>) -> Result<()>;

    /// Delete everything matching `clear_before_saving`, then upsert, in one commit
    async fn save_clearing(
        &self,
        objects: Vec<Self::Model>,
        clear_before_saving: &SearchRequest,
    ) -> Result<()>;

    /// Matching models in request order. Unconvertible records are dropped.
    async fn present(&self, request: &SearchRequest) -> Result<Vec<Self::Model>>;

    /// Delete matching records. `NoChanges` when nothing matched.
    async fn delete(&self, request: &SearchRequest) -> Result<()>;

    /// Batch-delete every record of this entity type
    async fn erase_all_data(&self) -> Result<()>;

    /// Auto-updating results, if constructed with an auto-update request
    fn live_results(&self) -> Option<LiveResults<Self::Model>>;
}
