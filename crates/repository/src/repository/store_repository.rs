//! Store-backed repository
//!
//! Every operation is packaged as a closure, handed to the context source as
//! a background task, and awaited through a oneshot channel. The task owns
//! its write context for its whole lifetime; nothing it stages is visible to
//! the main context until the commit step propagates it.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    ChangeSet, FetchRequest, RepositoryConfig, RepositoryError, Result, SearchRequest,
};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::context::{BatchDeleteResult, BatchResultType, StoreContextSource, WriteContext};
use crate::live::{LiveQuerySubscription, LiveResults};
use crate::mapper::EntityMapper;
use crate::repository::commit::apply_changes;
use crate::repository::projection::project;
use crate::repository::reconcile::reconcile;
use crate::repository::Repository;

/// Repository over any [`StoreContextSource`]
pub struct StoreRepository<M: EntityMapper> {
    source: Arc<dyn StoreContextSource>,
    mapper: Arc<M>,
    config: RepositoryConfig,
    live: Option<LiveQuerySubscription<M::Model>>,
}

impl<M: EntityMapper> StoreRepository<M> {
    /// Create a repository with default configuration.
    ///
    /// With an `auto_update_request`, the repository keeps a live projection
    /// of it for its whole lifetime (see [`Repository::live_results`]).
    pub fn new(
        source: Arc<dyn StoreContextSource>,
        mapper: M,
        auto_update_request: Option<SearchRequest>,
    ) -> Self {
        Self::with_config(source, mapper, auto_update_request, RepositoryConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn StoreContextSource>,
        mapper: M,
        auto_update_request: Option<SearchRequest>,
        config: RepositoryConfig,
    ) -> Self {
        let mapper = Arc::new(mapper);
        let live = auto_update_request.map(|request| {
            LiveQuerySubscription::activate(Arc::clone(&mapper), source.main_context(), &request)
        });

        Self {
            source,
            mapper,
            config,
            live,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn entity_name(&self) -> &str {
        self.mapper.entity_name()
    }

    /// Run `work` on a background write context and wait for its result
    async fn perform<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn WriteContext) -> Result<T> + Send + 'static,
    {
        let (promise, outcome) = oneshot::channel();
        self.source.run_background_task(Box::new(move |context| {
            let _ = promise.send(work(context));
        }));
        outcome.await.map_err(|_| RepositoryError::TaskAborted)?
    }

    async fn save_in(
        &self,
        objects: Vec<M::Model>,
        clear_before_saving: Option<SearchRequest>,
    ) -> Result<()> {
        let mapper = Arc::clone(&self.mapper);
        let main = self.source.main_context();
        let policy = self.config.conflict_policy;
        let batch_size = self.config.reconcile_batch_size;

        self.perform(move |context| {
            let entity = mapper.entity_name();

            if let Some(clear) = clear_before_saving {
                let ids = context
                    .fetch_ids(&FetchRequest::from_search(entity, &clear))
                    .map_err(RepositoryError::ReadFailed)?;
                debug!(entity, cleared = ids.len(), "clearing before save");
                for id in ids {
                    context.delete(id);
                }
            }

            let stats = reconcile(context, mapper.as_ref(), &objects, batch_size)
                .map_err(RepositoryError::ReadFailed)?;
            debug!(
                entity,
                inserted = stats.inserted,
                updated = stats.updated,
                collapsed = stats.collapsed,
                "reconciled objects"
            );

            apply_changes(context, main.as_ref(), policy)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<M: EntityMapper> Repository for StoreRepository<M> {
    type Model = M::Model;

    async fn save(&self, objects: Vec<M::Model>) -> Result<()> {
        self.save_in(objects, None).await
    }

    async fn save_clearing(
        &self,
        objects: Vec<M::Model>,
        clear_before_saving: &SearchRequest,
    ) -> Result<()> {
        self.save_in(objects, Some(clear_before_saving.clone())).await
    }

    async fn present(&self, request: &SearchRequest) -> Result<Vec<M::Model>> {
        let mapper = Arc::clone(&self.mapper);
        let fetch = FetchRequest::from_search(self.entity_name(), request);
        let mode = self.config.projection;

        self.perform(move |context| {
            let records = context.fetch(&fetch).map_err(RepositoryError::ReadFailed)?;
            project(mapper.as_ref(), &records, mode)
        })
        .await
    }

    async fn delete(&self, request: &SearchRequest) -> Result<()> {
        let fetch = FetchRequest::from_search(self.entity_name(), request);
        let main = self.source.main_context();
        let policy = self.config.conflict_policy;

        self.perform(move |context| {
            let ids = context
                .fetch_ids(&fetch)
                .map_err(RepositoryError::ReadFailed)?;
            debug!(entity = %fetch.entity, matched = ids.len(), "deleting by request");
            for id in ids {
                context.delete(id);
            }
            apply_changes(context, main.as_ref(), policy)?;
            Ok(())
        })
        .await
    }

    async fn erase_all_data(&self) -> Result<()> {
        let entity = self.entity_name().to_string();
        let main = self.source.main_context();

        self.perform(move |context| {
            let result = context
                .execute_batch_delete(&FetchRequest::all(&entity), BatchResultType::ObjectIds)
                .map_err(RepositoryError::DeleteFailed)?;
            let BatchDeleteResult::ObjectIds(ids) = result else {
                return Err(RepositoryError::NoChanges);
            };

            info!(entity = %entity, erased = ids.len(), "erased all data");
            // Batch deletes skip change tracking; tell the read side explicitly
            main.merge_changes(ChangeSet::deleted(&entity, ids));
            Ok(())
        })
        .await
    }

    fn live_results(&self) -> Option<LiveResults<M::Model>> {
        self.live.as_ref().map(LiveQuerySubscription::results)
    }
}
