//! Workspace umbrella crate for the newsmap refresh pipeline.
//!
//! Each refresh cycle pushes fresh article embeddings into the vector store,
//! then recomputes the cluster and projection caches for every
//! `(hours, min_similarity)` cell of a fixed grid:
//!
//! ```text
//! RefreshScheduler ─┬─> VectorSynchronizer   relational store ──> vector store
//!                   └─> GridRefresher        for each grid cell:
//!                         ClusterGenerator     vector partition + article rows
//!                         ProjectionGenerator  2-D layout + opacity + cluster ids
//!                         CacheWrites          one batch commit per sweep
//! ```
//!
//! The relational store, the cache tables and the vector store are reached only
//! through the async traits re-exported below, so each can be swapped or
//! wrapped for tests.

pub mod clusters;
pub mod config;
pub mod grid;
pub mod projection;
pub mod scheduler;
pub mod sync;

pub use clusters::ClusterGenerator;
pub use config::{ConfigLoadError, LogFormat, RefreshConfig};
pub use grid::{grid_keys, GridRefresher, GridReport, GRID_HOURS, GRID_SIMILARITIES};
pub use projection::{ProjectionGenerator, PROJECTION_LIMIT};
pub use scheduler::{CycleReport, RefreshScheduler, SchedulerHandle, SchedulerState};
pub use sync::{SyncReport, VectorSynchronizer};

pub use layout::{LayoutConfig, LayoutError};
pub use store::{ArticleRepository, CacheRepository, StoreError};
pub use vector::{VectorError, VectorStore};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Source of "now" for window cutoffs, opacity and cache timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Errors surfaced by a pipeline phase or grid cell.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("relational store failure: {0}")]
    Store(#[from] StoreError),

    #[error("vector store failure: {0}")]
    Vector(#[from] VectorError),

    #[error("layout failure: {0}")]
    Layout(#[from] LayoutError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for RefreshError {
    fn from(err: tokio::task::JoinError) -> Self {
        RefreshError::Task(err.to_string())
    }
}

/// Metric names emitted through the `metrics` facade.
pub mod metric_names {
    pub const SYNC_SYNCED: &str = "newsmap_sync_synced_total";
    pub const SYNC_ERRORS: &str = "newsmap_sync_errors_total";
    pub const GRID_CELLS_FAILED: &str = "newsmap_grid_cells_failed_total";
    pub const CYCLE_DURATION: &str = "newsmap_cycle_duration_seconds";
    pub const CYCLES_FAILED: &str = "newsmap_cycles_failed_total";
}

/// One synchronization pass followed by one grid sweep.
pub struct RefreshPipeline {
    synchronizer: VectorSynchronizer,
    grid: GridRefresher,
}

impl RefreshPipeline {
    pub fn new(
        cfg: &RefreshConfig,
        articles: Arc<dyn ArticleRepository>,
        cache: Arc<dyn CacheRepository>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self::with_clock(cfg, articles, cache, vectors, Arc::new(Utc::now))
    }

    pub fn with_clock(
        cfg: &RefreshConfig,
        articles: Arc<dyn ArticleRepository>,
        cache: Arc<dyn CacheRepository>,
        vectors: Arc<dyn VectorStore>,
        clock: Clock,
    ) -> Self {
        let synchronizer = VectorSynchronizer::new(
            Arc::clone(&articles),
            Arc::clone(&vectors),
            cfg.vector_dimensions,
            cfg.sync_window_hours(),
            Arc::clone(&clock),
        );
        let clusters = ClusterGenerator::new(Arc::clone(&articles), vectors);
        let projections = ProjectionGenerator::new(
            articles,
            clusters.clone(),
            cfg.vector_dimensions,
            cfg.layout,
            Arc::clone(&clock),
        );
        let grid = GridRefresher::new(clusters, projections, cache, clock);
        Self { synchronizer, grid }
    }

    pub fn synchronizer(&self) -> &VectorSynchronizer {
        &self.synchronizer
    }

    pub fn grid(&self) -> &GridRefresher {
        &self.grid
    }

    /// Run one cycle.
    ///
    /// A failed synchronization phase is logged and the sweep still runs over
    /// whatever the vector store already holds. A failed sweep is returned.
    pub async fn run_cycle(&self) -> Result<CycleReport, RefreshError> {
        let sync = match self.synchronizer.run().await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(error = %err, "vector_sync_failure");
                None
            }
        };
        let grid = self.grid.refresh().await?;
        Ok(CycleReport { sync, grid })
    }
}
