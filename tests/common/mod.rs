#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use newsmap::{RefreshConfig, RefreshPipeline};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use store::{
    Article, ArticleId, ArticleRepository, CacheKey, CacheRepository, CacheWrites,
    ClusterCacheEntry, NewsStore, ProjectionCacheEntry, StoreError,
};
use tokio::sync::Notify;
use vector::{
    ClusterPartition, Embedding, InMemoryVectorStore, VectorError, VectorMetadata, VectorRecord,
    VectorStore, VectorStoreConfig,
};

pub const DIMS: usize = 4;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn config() -> RefreshConfig {
    RefreshConfig {
        vector_dimensions: DIMS,
        database_path: None,
        ..RefreshConfig::default()
    }
}

pub fn article(id: ArticleId, minutes_ago: i64, embedding: Value) -> Article {
    let seen = fixed_now() - Duration::minutes(minutes_ago);
    Article {
        id,
        title: format!("story {id}"),
        summary: Some(format!("summary {id}")),
        url: format!("https://news.example/{id}"),
        source_url: "https://news.example".into(),
        first_seen_at: seen - Duration::hours(1),
        last_seen_at: seen,
        created_at: seen - Duration::hours(1),
        updated_at: seen,
        hit_count: id as u64,
        embedding: Some(embedding),
    }
}

/// Two tight topics inside the last day, one older story per topic window,
/// and one row whose embedding has the wrong length.
pub fn seeded_store() -> NewsStore {
    let store = NewsStore::in_memory();
    let rows = [
        article(1, 30, json!([1.0, 0.0, 0.0, 0.0])),
        article(2, 120, json!([0.95, 0.05, 0.0, 0.0])),
        article(3, 30 * 60, json!([0.9, 0.1, 0.0, 0.0])),
        article(4, 60, json!([0.0, 1.0, 0.0, 0.0])),
        article(5, 180, json!("[0.0,0.95,0.05,0.0]")),
        article(6, 50 * 60, json!([0.0, 0.0, 0.0, 1.0])),
        article(7, 60, json!([1.0, 2.0])),
    ];
    for row in &rows {
        store.upsert_article(row).unwrap();
    }
    store
}

pub fn vector_store() -> Arc<InMemoryVectorStore> {
    let cfg = VectorStoreConfig::new(DIMS, Duration::hours(24));
    Arc::new(InMemoryVectorStore::new(cfg).with_clock(fixed_now))
}

pub fn pipeline(
    articles: Arc<dyn ArticleRepository>,
    cache: Arc<dyn CacheRepository>,
    vectors: Arc<dyn VectorStore>,
) -> RefreshPipeline {
    RefreshPipeline::with_clock(&config(), articles, cache, vectors, Arc::new(fixed_now))
}

pub fn store_pipeline(store: &NewsStore, vectors: Arc<dyn VectorStore>) -> RefreshPipeline {
    pipeline(Arc::new(store.clone()), Arc::new(store.clone()), vectors)
}

pub fn unit_vector(v: [f32; DIMS]) -> Embedding {
    Embedding::from_vec(v.to_vec(), DIMS).unwrap()
}

/// Vector store with injected faults: partition queries for one window size
/// fail, writes for `fail_store` ids error, and writes for `decline_store`
/// ids are refused with `Ok(false)`.
pub struct FlakyVectors {
    pub inner: Arc<InMemoryVectorStore>,
    pub fail_hours: Option<u32>,
    pub fail_store: Vec<ArticleId>,
    pub decline_store: Vec<ArticleId>,
}

impl FlakyVectors {
    pub fn failing_partition(inner: Arc<InMemoryVectorStore>, hours: u32) -> Self {
        Self {
            inner,
            fail_hours: Some(hours),
            fail_store: Vec::new(),
            decline_store: Vec::new(),
        }
    }

    pub fn failing_writes(
        inner: Arc<InMemoryVectorStore>,
        fail_store: Vec<ArticleId>,
        decline_store: Vec<ArticleId>,
    ) -> Self {
        Self {
            inner,
            fail_hours: None,
            fail_store,
            decline_store,
        }
    }
}

#[async_trait]
impl VectorStore for FlakyVectors {
    async fn store_vector(
        &self,
        news_id: ArticleId,
        embedding: &Embedding,
        metadata: VectorMetadata,
        last_seen_at: DateTime<Utc>,
    ) -> Result<bool, VectorError> {
        if self.fail_store.contains(&news_id) {
            return Err(VectorError::backend("injected write failure"));
        }
        if self.decline_store.contains(&news_id) {
            return Ok(false);
        }
        self.inner
            .store_vector(news_id, embedding, metadata, last_seen_at)
            .await
    }

    async fn get_vector(&self, news_id: ArticleId) -> Result<Option<VectorRecord>, VectorError> {
        self.inner.get_vector(news_id).await
    }

    async fn get_clusters(
        &self,
        hours: u32,
        min_similarity: f32,
    ) -> Result<ClusterPartition, VectorError> {
        if self.fail_hours == Some(hours) {
            return Err(VectorError::backend("injected partition failure"));
        }
        self.inner.get_clusters(hours, min_similarity).await
    }
}

/// Article repository whose first `fail_first` recent-article reads fail.
pub struct FlakyArticles {
    pub inner: NewsStore,
    pub fail_first: usize,
    pub calls: AtomicUsize,
}

impl FlakyArticles {
    pub fn new(inner: NewsStore, fail_first: usize) -> Self {
        Self {
            inner,
            fail_first,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ArticleRepository for FlakyArticles {
    async fn recent_articles(
        &self,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Article>, StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
            return Err(StoreError::backend("injected read failure"));
        }
        self.inner.recent_articles(cutoff, limit).await
    }

    async fn articles_by_ids(
        &self,
        ids: &[ArticleId],
    ) -> Result<HashMap<ArticleId, Article>, StoreError> {
        self.inner.articles_by_ids(ids).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    Error,
    Panic,
}

/// Cache repository whose commits always fail, either with an error or a panic.
pub struct FailingCache {
    pub fault: CommitFault,
    pub commits: AtomicUsize,
}

impl FailingCache {
    pub fn new(fault: CommitFault) -> Self {
        Self {
            fault,
            commits: AtomicUsize::new(0),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheRepository for FailingCache {
    async fn commit(&self, _writes: CacheWrites) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            CommitFault::Error => Err(StoreError::backend("injected commit failure")),
            CommitFault::Panic => panic!("injected commit panic"),
        }
    }

    async fn cluster_entry(&self, _key: CacheKey) -> Result<Option<ClusterCacheEntry>, StoreError> {
        Ok(None)
    }

    async fn projection_entry(
        &self,
        _key: CacheKey,
    ) -> Result<Option<ProjectionCacheEntry>, StoreError> {
        Ok(None)
    }
}

/// Cache repository whose commit parks until released.
pub struct GatedCache {
    pub inner: NewsStore,
    pub entered: Notify,
    pub release: Notify,
    pub commits: AtomicUsize,
}

impl GatedCache {
    pub fn new(inner: NewsStore) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
            commits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CacheRepository for GatedCache {
    async fn commit(&self, writes: CacheWrites) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.commit(writes).await
    }

    async fn cluster_entry(&self, key: CacheKey) -> Result<Option<ClusterCacheEntry>, StoreError> {
        self.inner.cluster_entry(key).await
    }

    async fn projection_entry(
        &self,
        key: CacheKey,
    ) -> Result<Option<ProjectionCacheEntry>, StoreError> {
        self.inner.projection_entry(key).await
    }
}
