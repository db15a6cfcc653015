//! # repokit - Repository demo
//!
//! Wires a `StoreRepository` over the in-memory store and runs the usual
//! lifecycle against a batch of mock todos.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  main.rs (this file) - Wiring                                   │
//! │    │                                                            │
//! │    ├── Creates: InMemoryContextSource (adapter)                 │
//! │    ├── Creates: StoreRepository<TodoEntityMapper>               │
//! │    └── Runs: save → present → delete → erase                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage:
//!   repokit                          - Run with 20000 todos
//!   repokit --count 500 --policy reject
//!   repokit --config repokit.yaml    - Load RepositoryConfig from a file

mod todo;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use repository::{Repository, StoreRepository};
use shared::{
    ConflictPolicy, IgnoreNoChanges, Predicate, RepositoryConfig, SearchRequest, SortDescriptor,
};
use store_memory::InMemoryContextSource;
use tracing::info;

use crate::todo::{Todo, TodoEntityMapper};

#[derive(Parser)]
#[command(name = "repokit")]
#[command(about = "repokit - Bulk upsert repository over a local object store")]
#[command(version)]
struct Cli {
    /// Number of mock todos to save
    #[arg(short, long, default_value_t = 20000)]
    count: usize,

    /// Repository configuration (JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the conflict policy (incoming-wins, existing-wins, reject)
    #[arg(long)]
    policy: Option<ConflictPolicy>,

    /// Reconcile saves in chunks of this size
    #[arg(long)]
    batch_size: Option<usize>,
}

impl Cli {
    fn repository_config(&self) -> anyhow::Result<RepositoryConfig> {
        let mut config = match &self.config {
            Some(path) => RepositoryConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RepositoryConfig::default(),
        };
        if let Some(policy) = self.policy {
            config = config.with_conflict_policy(policy);
        }
        if let Some(size) = self.batch_size {
            config = config.with_reconcile_batch_size(size);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.repository_config()?;
    info!(?config, "repokit starting");

    // ========================================
    // Wiring
    // ========================================

    let source = Arc::new(InMemoryContextSource::new());
    let open_todos = SearchRequest::matching(Predicate::eq("isCompleted", false));
    let repository =
        StoreRepository::with_config(source.clone(), TodoEntityMapper, Some(open_todos), config);
    let live = repository
        .live_results()
        .context("repository was built without an auto-update request")?;

    // ========================================
    // Save
    // ========================================

    let todos = Todo::mock(cli.count);
    let started = Instant::now();
    repository.save(todos.clone()).await?;
    info!(count = todos.len(), elapsed = ?started.elapsed(), "saved todos");

    // Saving the same data again commits nothing
    let started = Instant::now();
    repository.save(todos).await.ignore_no_changes()?;
    info!(elapsed = ?started.elapsed(), "re-saved unchanged todos");

    // ========================================
    // Present
    // ========================================

    let started = Instant::now();
    let by_id = SearchRequest::all().sorted_by(SortDescriptor::asc("id"));
    let all = repository.present(&by_id).await?;
    info!(count = all.len(), elapsed = ?started.elapsed(), "presented todos");

    // ========================================
    // Delete completed
    // ========================================

    let started = Instant::now();
    let completed = SearchRequest::matching(Predicate::eq("isCompleted", true));
    repository.delete(&completed).await.ignore_no_changes()?;
    let remaining = repository.present(&SearchRequest::all()).await?;
    info!(
        remaining = remaining.len(),
        open = live.current().len(),
        elapsed = ?started.elapsed(),
        "deleted completed todos"
    );

    // ========================================
    // Erase
    // ========================================

    let started = Instant::now();
    repository.erase_all_data().await.ignore_no_changes()?;
    info!(
        stored = source.store().count(todo::ENTITY)?,
        elapsed = ?started.elapsed(),
        "erased all data"
    );

    Ok(())
}
