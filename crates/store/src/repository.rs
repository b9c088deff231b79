//! Async seams the refresh pipeline depends on.
//!
//! Backends are synchronous, so [`NewsStore`] runs each call on Tokio's
//! blocking pool. Every method here is a suspension point for the caller.

use crate::{
    Article, ArticleId, CacheKey, CacheWrites, ClusterCacheEntry, NewsStore, ProjectionCacheEntry,
    StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Read access to article rows.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Articles with an embedding whose `last_seen_at >= cutoff`, newest first.
    async fn recent_articles(
        &self,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Article>, StoreError>;

    /// Batched lookup; ids with no row are absent from the result.
    async fn articles_by_ids(
        &self,
        ids: &[ArticleId],
    ) -> Result<HashMap<ArticleId, Article>, StoreError>;
}

/// Read/write access to the two cache tables.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Commit all queued writes atomically; last writer wins per key.
    async fn commit(&self, writes: CacheWrites) -> Result<(), StoreError>;

    async fn cluster_entry(&self, key: CacheKey) -> Result<Option<ClusterCacheEntry>, StoreError>;

    async fn projection_entry(
        &self,
        key: CacheKey,
    ) -> Result<Option<ProjectionCacheEntry>, StoreError>;
}

#[async_trait]
impl ArticleRepository for NewsStore {
    async fn recent_articles(
        &self,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Article>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_recent(cutoff, limit)).await?
    }

    async fn articles_by_ids(
        &self,
        ids: &[ArticleId],
    ) -> Result<HashMap<ArticleId, Article>, StoreError> {
        let store = self.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || store.load_by_ids(&ids)).await?
    }
}

#[async_trait]
impl CacheRepository for NewsStore {
    async fn commit(&self, writes: CacheWrites) -> Result<(), StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.apply(writes)).await?
    }

    async fn cluster_entry(&self, key: CacheKey) -> Result<Option<ClusterCacheEntry>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_cluster_entry(key)).await?
    }

    async fn projection_entry(
        &self,
        key: CacheKey,
    ) -> Result<Option<ProjectionCacheEntry>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_projection_entry(key)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendConfig, ClusterMap};
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn redb_store_commits_through_repository() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_string_lossy().into_owned();
        let store = NewsStore::open(&BackendConfig::redb(path)).unwrap();

        let key = CacheKey::new(24, 0.7);
        let mut writes = CacheWrites::new();
        writes.put_clusters(key, ClusterMap::new(), Utc::now());
        writes.put_projection(key, Vec::new(), Utc::now());
        store.commit(writes).await.unwrap();

        assert!(store.cluster_entry(key).await.unwrap().is_some());
        assert!(store.projection_entry(key).await.unwrap().is_some());
        assert!(store
            .cluster_entry(CacheKey::new(72, 0.7))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn repository_reads_match_sync_reads() {
        let store = NewsStore::in_memory();
        let recent = store.recent_articles(Utc::now(), Some(10)).await.unwrap();
        assert!(recent.is_empty());
        let by_id = store.articles_by_ids(&[1, 2]).await.unwrap();
        assert!(by_id.is_empty());
    }
}
