//! Cluster generation: vector store partition enriched with article rows.

use crate::RefreshError;
use std::collections::BTreeSet;
use std::sync::Arc;
use store::{ArticleId, ArticleRepository, ClusterMap, ClusterMember};
use vector::VectorStore;

/// Builds the enriched cluster mapping for one `(hours, min_similarity)` cell.
#[derive(Clone)]
pub struct ClusterGenerator {
    articles: Arc<dyn ArticleRepository>,
    vectors: Arc<dyn VectorStore>,
}

impl ClusterGenerator {
    pub fn new(articles: Arc<dyn ArticleRepository>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { articles, vectors }
    }

    /// Partition articles last seen within `hours` and attach their display fields.
    ///
    /// An empty partition yields an empty map. Members whose article no longer
    /// exists are dropped, and so is a cluster left with no members. Member
    /// order and cluster ids are those reported by the vector store.
    pub async fn generate(
        &self,
        hours: u32,
        min_similarity: f32,
    ) -> Result<ClusterMap, RefreshError> {
        let partition = self.vectors.get_clusters(hours, min_similarity).await?;
        if partition.is_empty() {
            tracing::debug!(hours, min_similarity, "clusters_empty");
            return Ok(ClusterMap::new());
        }

        let ids: Vec<ArticleId> = partition
            .values()
            .flatten()
            .map(|hit| hit.article_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let rows = self.articles.articles_by_ids(&ids).await?;

        let mut dropped = 0usize;
        let mut enriched = ClusterMap::new();
        for (cluster_id, hits) in partition {
            let members: Vec<ClusterMember> = hits
                .iter()
                .filter_map(|hit| match rows.get(&hit.article_id) {
                    Some(article) => Some(ClusterMember::from_article(
                        article,
                        hit.similarity,
                        cluster_id,
                    )),
                    None => {
                        dropped += 1;
                        None
                    }
                })
                .collect();
            if !members.is_empty() {
                enriched.insert(cluster_id, members);
            }
        }

        if dropped > 0 {
            tracing::debug!(hours, min_similarity, dropped, "cluster_members_dropped");
        }
        Ok(enriched)
    }
}
