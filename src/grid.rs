//! Grid cache refresh over the fixed `(hours, min_similarity)` cells.

use crate::metric_names::GRID_CELLS_FAILED;
use crate::{ClusterGenerator, Clock, ProjectionGenerator, RefreshError};
use std::sync::Arc;
use std::time::Instant;
use store::{CacheKey, CacheRepository, CacheWrites};
use tracing::Instrument;

/// Window sizes in hours.
pub const GRID_HOURS: [u32; 3] = [24, 48, 72];
/// Similarity thresholds.
pub const GRID_SIMILARITIES: [f32; 3] = [0.5, 0.6, 0.7];

/// Every grid cell in sweep order: hours outer, thresholds inner.
pub fn grid_keys() -> impl Iterator<Item = CacheKey> {
    GRID_HOURS.into_iter().flat_map(|hours| {
        GRID_SIMILARITIES
            .into_iter()
            .map(move |min_similarity| CacheKey::new(hours, min_similarity))
    })
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridReport {
    pub cells_refreshed: usize,
    pub cells_failed: usize,
    /// Cells whose cluster cache row was left as it was because no clusters were found.
    pub clusters_skipped_empty: usize,
}

struct CellWrites {
    writes: CacheWrites,
    clusters_skipped: bool,
}

/// Recomputes both cache tables for every grid cell and commits them together.
pub struct GridRefresher {
    clusters: ClusterGenerator,
    projections: ProjectionGenerator,
    cache: Arc<dyn CacheRepository>,
    clock: Clock,
}

impl GridRefresher {
    pub fn new(
        clusters: ClusterGenerator,
        projections: ProjectionGenerator,
        cache: Arc<dyn CacheRepository>,
        clock: Clock,
    ) -> Self {
        Self {
            clusters,
            projections,
            cache,
            clock,
        }
    }

    /// Sweep all cells in order, then commit every queued row in one batch.
    ///
    /// A cell that fails is logged and contributes no rows; its previous cache
    /// rows stay in place. Only the final commit failing is an error.
    pub async fn refresh(&self) -> Result<GridReport, RefreshError> {
        let started = Instant::now();
        let mut report = GridReport::default();
        let mut writes = CacheWrites::new();

        for key in grid_keys() {
            let span = tracing::info_span!(
                "grid.cell",
                hours = key.hours,
                min_similarity = key.min_similarity
            );
            match self.refresh_cell(key).instrument(span).await {
                Ok(cell) => {
                    report.cells_refreshed += 1;
                    if cell.clusters_skipped {
                        report.clusters_skipped_empty += 1;
                    }
                    writes.extend(cell.writes);
                }
                Err(err) => {
                    report.cells_failed += 1;
                    metrics::counter!(GRID_CELLS_FAILED).increment(1);
                    tracing::warn!(
                        hours = key.hours,
                        min_similarity = key.min_similarity,
                        error = %err,
                        "grid_cell_failure"
                    );
                }
            }
        }

        let rows = writes.len();
        if !writes.is_empty() {
            self.cache.commit(writes).await?;
        }
        tracing::info!(
            cells_refreshed = report.cells_refreshed,
            cells_failed = report.cells_failed,
            clusters_skipped_empty = report.clusters_skipped_empty,
            rows,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "grid_refresh"
        );
        Ok(report)
    }

    /// The projection row is always replaced, even when empty. The cluster row is
    /// only replaced when clusters were found, so a sparse cycle keeps the last
    /// non-empty cluster cache.
    async fn refresh_cell(&self, key: CacheKey) -> Result<CellWrites, RefreshError> {
        let clusters = self.clusters.generate(key.hours, key.min_similarity).await?;
        let points = self.projections.project(key.hours, &clusters).await?;
        let created_at = (self.clock)();

        let mut writes = CacheWrites::new();
        tracing::debug!(points = points.len(), clusters = clusters.len(), "grid_cell_computed");
        writes.put_projection(key, points, created_at);
        let clusters_skipped = clusters.is_empty();
        if !clusters_skipped {
            writes.put_clusters(key, clusters, created_at);
        }
        Ok(CellWrites {
            writes,
            clusters_skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_has_nine_distinct_cells_in_order() {
        let keys: Vec<CacheKey> = grid_keys().collect();
        assert_eq!(keys.len(), 9);
        assert_eq!(keys[0], CacheKey::new(24, 0.5));
        assert_eq!(keys[1], CacheKey::new(24, 0.6));
        assert_eq!(keys[3], CacheKey::new(48, 0.5));
        assert_eq!(keys[8], CacheKey::new(72, 0.7));

        let mut storage: Vec<String> = keys.iter().map(CacheKey::storage_key).collect();
        storage.sort();
        storage.dedup();
        assert_eq!(storage.len(), 9);
    }
}
