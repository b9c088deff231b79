//! 2-D projection of recent articles with cluster ids and recency opacity.

use crate::{ClusterGenerator, Clock, RefreshError};
use chrono::Duration;
use layout::{recency_opacity, LayoutConfig};
use std::collections::HashMap;
use std::sync::Arc;
use store::{Article, ArticleId, ArticleRepository, ClusterId, ClusterMap, ProjectionPoint};
use vector::Embedding;

/// Upper bound on articles laid out per cell, newest first.
pub const PROJECTION_LIMIT: usize = 1000;

pub struct ProjectionGenerator {
    articles: Arc<dyn ArticleRepository>,
    clusters: ClusterGenerator,
    dimensions: usize,
    layout: LayoutConfig,
    clock: Clock,
}

impl ProjectionGenerator {
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        clusters: ClusterGenerator,
        dimensions: usize,
        layout: LayoutConfig,
        clock: Clock,
    ) -> Self {
        Self {
            articles,
            clusters,
            dimensions,
            layout,
            clock,
        }
    }

    /// Cluster the cell, then project it.
    pub async fn generate(
        &self,
        hours: u32,
        min_similarity: f32,
    ) -> Result<Vec<ProjectionPoint>, RefreshError> {
        let clusters = self.clusters.generate(hours, min_similarity).await?;
        self.project(hours, &clusters).await
    }

    /// Project the newest articles seen within `hours`, tagging each with its
    /// cluster in `clusters` (if any).
    ///
    /// Articles whose embedding does not decode are left out. Fewer than two
    /// remaining articles gives an empty projection. Output is newest first.
    pub async fn project(
        &self,
        hours: u32,
        clusters: &ClusterMap,
    ) -> Result<Vec<ProjectionPoint>, RefreshError> {
        let lookup: HashMap<ArticleId, ClusterId> = clusters
            .iter()
            .flat_map(|(&cluster_id, members)| members.iter().map(move |m| (m.id, cluster_id)))
            .collect();

        let now = (self.clock)();
        let cutoff = now - Duration::hours(i64::from(hours));
        let recent = self
            .articles
            .recent_articles(cutoff, Some(PROJECTION_LIMIT))
            .await?;

        let mut kept: Vec<Article> = Vec::with_capacity(recent.len());
        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(recent.len());
        for article in recent {
            let Some(raw) = article.embedding.as_ref() else {
                continue;
            };
            match Embedding::decode(raw, self.dimensions) {
                Ok(embedding) => {
                    rows.push(embedding.into_inner());
                    kept.push(article);
                }
                Err(err) => {
                    tracing::debug!(
                        news_id = article.id,
                        error = %err,
                        "projection_embedding_rejected"
                    );
                }
            }
        }

        if kept.len() < 2 {
            tracing::debug!(hours, articles = kept.len(), "projection_too_few_points");
            return Ok(Vec::new());
        }

        let cfg = self.layout;
        let coords = tokio::task::spawn_blocking(move || layout::project(&rows, &cfg)).await??;

        Ok(kept
            .into_iter()
            .zip(coords.rows())
            .map(|(article, xy)| ProjectionPoint {
                cluster_id: lookup.get(&article.id).copied(),
                opacity: recency_opacity(now, article.last_seen_at),
                x: xy[0],
                y: xy[1],
                id: article.id,
                title: article.title,
                url: article.url,
                source_url: article.source_url,
                last_seen_at: article.last_seen_at,
            })
            .collect())
    }
}
