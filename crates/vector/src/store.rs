use crate::ann::{AnnConfig, AnnIndex};
use crate::cluster::{partition, Candidate, ClusterPartition};
use crate::{ArticleId, Embedding, VectorError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Display snapshot stored next to a vector at sync time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VectorMetadata {
    pub title: String,
    pub url: String,
    pub source_url: String,
}

/// A vector held by the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VectorRecord {
    pub news_id: ArticleId,
    pub embedding: Embedding,
    pub metadata: VectorMetadata,
    pub last_seen_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
}

/// Capability surface of the similarity backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector for `news_id`.
    ///
    /// Returns `Ok(false)` when the backend declined to keep the record.
    async fn store_vector(
        &self,
        news_id: ArticleId,
        embedding: &Embedding,
        metadata: VectorMetadata,
        last_seen_at: DateTime<Utc>,
    ) -> Result<bool, VectorError>;

    async fn get_vector(&self, news_id: ArticleId) -> Result<Option<VectorRecord>, VectorError>;

    /// Partition vectors last seen within `hours` by similarity `>= min_similarity`.
    /// An empty partition is a normal answer.
    async fn get_clusters(
        &self,
        hours: u32,
        min_similarity: f32,
    ) -> Result<ClusterPartition, VectorError>;
}

/// Settings for [`InMemoryVectorStore`].
#[derive(Debug, Clone, Copy)]
pub struct VectorStoreConfig {
    pub dimensions: usize,
    /// Records not re-stored within this long are treated as gone.
    pub ttl: Duration,
    pub ann: AnnConfig,
}

impl VectorStoreConfig {
    pub fn new(dimensions: usize, ttl: Duration) -> Self {
        Self {
            dimensions,
            ttl,
            ann: AnnConfig::default(),
        }
    }

    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Inner {
    records: HashMap<ArticleId, VectorRecord>,
    index: AnnIndex,
}

impl Inner {
    fn evict_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|_, rec| now - rec.stored_at <= ttl);
        let evicted = before - self.records.len();
        if evicted > 0 {
            let records = &self.records;
            self.index.retain(|id| records.contains_key(&id));
        }
        evicted
    }
}

/// Process-local vector store with TTL'd records and a neighbour index.
pub struct InMemoryVectorStore {
    cfg: VectorStoreConfig,
    inner: Arc<RwLock<Inner>>,
    clock: Clock,
}

impl InMemoryVectorStore {
    pub fn new(cfg: VectorStoreConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                records: HashMap::new(),
                index: AnnIndex::new(cfg.dimensions, cfg.ann),
            })),
            cfg,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Number of live (unexpired) records.
    pub fn len(&self) -> Result<usize, VectorError> {
        let now = (self.clock)();
        let guard = self.inner.read().map_err(|_| VectorError::poisoned())?;
        Ok(guard
            .records
            .values()
            .filter(|rec| now - rec.stored_at <= self.cfg.ttl)
            .count())
    }

    pub fn is_empty(&self) -> Result<bool, VectorError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store_vector(
        &self,
        news_id: ArticleId,
        embedding: &Embedding,
        metadata: VectorMetadata,
        last_seen_at: DateTime<Utc>,
    ) -> Result<bool, VectorError> {
        if embedding.dimension() != self.cfg.dimensions {
            return Err(VectorError::DimensionMismatch {
                expected: self.cfg.dimensions,
                got: embedding.dimension(),
            });
        }
        let now = (self.clock)();
        if now - last_seen_at > self.cfg.ttl {
            return Ok(false);
        }

        let mut guard = self.inner.write().map_err(|_| VectorError::poisoned())?;
        guard.evict_expired(now, self.cfg.ttl);
        guard
            .index
            .upsert(news_id, embedding.as_slice().to_vec())?;
        guard.records.insert(
            news_id,
            VectorRecord {
                news_id,
                embedding: embedding.clone(),
                metadata,
                last_seen_at,
                stored_at: now,
            },
        );
        Ok(true)
    }

    async fn get_vector(&self, news_id: ArticleId) -> Result<Option<VectorRecord>, VectorError> {
        let now = (self.clock)();
        let guard = self.inner.read().map_err(|_| VectorError::poisoned())?;
        Ok(guard
            .records
            .get(&news_id)
            .filter(|rec| now - rec.stored_at <= self.cfg.ttl)
            .cloned())
    }

    async fn get_clusters(
        &self,
        hours: u32,
        min_similarity: f32,
    ) -> Result<ClusterPartition, VectorError> {
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        let ttl = self.cfg.ttl;

        // Index rebuild and the partition scan are CPU-bound.
        tokio::task::spawn_blocking(move || -> Result<ClusterPartition, VectorError> {
            let now = clock();
            let cutoff = now - Duration::hours(i64::from(hours));

            let mut guard = inner.write().map_err(|_| VectorError::poisoned())?;
            let evicted = guard.evict_expired(now, ttl);
            guard.index.build_if_needed();

            let candidates: Vec<Candidate> = guard
                .records
                .values()
                .filter(|rec| rec.last_seen_at >= cutoff)
                .map(|rec| Candidate {
                    id: rec.news_id,
                    last_seen_at: rec.last_seen_at,
                })
                .collect();
            let clusters = partition(&guard.index, &candidates, min_similarity)?;

            tracing::debug!(
                hours,
                min_similarity,
                candidates = candidates.len(),
                clusters = clusters.len(),
                evicted,
                "vector_clusters"
            );
            Ok(clusters)
        })
        .await
        .map_err(VectorError::backend)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn meta(id: ArticleId) -> VectorMetadata {
        VectorMetadata {
            title: format!("t{id}"),
            url: format!("https://n.example/{id}"),
            source_url: "https://n.example".into(),
        }
    }

    fn store_at(now: DateTime<Utc>) -> InMemoryVectorStore {
        InMemoryVectorStore::new(VectorStoreConfig::new(3, Duration::hours(24)))
            .with_clock(move || now)
    }

    #[tokio::test]
    async fn stored_vector_reads_back() {
        let now = Utc::now();
        let store = store_at(now);
        let embedding = Embedding::from_vec(vec![0.1, -0.2, 0.3], 3).unwrap();

        assert!(store.store_vector(9, &embedding, meta(9), now).await.unwrap());
        let record = store.get_vector(9).await.unwrap().unwrap();
        for (a, b) in record.embedding.as_slice().iter().zip(embedding.as_slice()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(record.metadata, meta(9));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_is_an_error() {
        let store = store_at(Utc::now());
        let embedding = Embedding::from_vec(vec![0.1, 0.2], 2).unwrap();
        let err = store
            .store_vector(1, &embedding, meta(1), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VectorError::DimensionMismatch { expected: 3, got: 2 }));
    }

    #[tokio::test]
    async fn stale_records_are_declined_and_expire() {
        let now = Arc::new(Mutex::new(Utc::now()));
        let clock = Arc::clone(&now);
        let store = InMemoryVectorStore::new(VectorStoreConfig::new(3, Duration::hours(24)))
            .with_clock(move || *clock.lock().unwrap());
        let embedding = Embedding::from_vec(vec![1.0, 0.0, 0.0], 3).unwrap();
        let t0 = *now.lock().unwrap();

        assert!(!store
            .store_vector(1, &embedding, meta(1), t0 - Duration::hours(25))
            .await
            .unwrap());
        assert!(store.store_vector(2, &embedding, meta(2), t0).await.unwrap());

        *now.lock().unwrap() = t0 + Duration::hours(25);
        assert!(store.get_vector(2).await.unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn clusters_respect_window() {
        let now = Utc::now();
        let store = store_at(now);
        let a = Embedding::from_vec(vec![1.0, 0.0, 0.0], 3).unwrap();
        let b = Embedding::from_vec(vec![0.98, 0.02, 0.0], 3).unwrap();

        store.store_vector(1, &a, meta(1), now).await.unwrap();
        store.store_vector(2, &b, meta(2), now - Duration::hours(1)).await.unwrap();
        store.store_vector(3, &a, meta(3), now - Duration::hours(20)).await.unwrap();

        let wide = store.get_clusters(24, 0.9).await.unwrap();
        assert_eq!(wide[&0].len(), 3);

        let narrow = store.get_clusters(2, 0.9).await.unwrap();
        let ids: Vec<_> = narrow[&0].iter().map(|h| h.article_id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(store.get_clusters(24, 0.9999).await.unwrap().len() <= 1);
    }

    #[tokio::test]
    async fn clustering_leaves_the_runtime_free() {
        // The clock parks until a task on this single-threaded runtime signals,
        // which can only happen if clustering runs off the runtime thread.
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let rx = Mutex::new(rx);
        let signalled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen = Arc::clone(&signalled);
        let now = Utc::now();
        let store = InMemoryVectorStore::new(VectorStoreConfig::new(3, Duration::hours(24)))
            .with_clock(move || {
                if !seen.load(std::sync::atomic::Ordering::SeqCst) {
                    let got = rx
                        .lock()
                        .unwrap()
                        .recv_timeout(std::time::Duration::from_secs(5));
                    seen.store(got.is_ok(), std::sync::atomic::Ordering::SeqCst);
                }
                now
            });

        tokio::spawn(async move {
            tx.send(()).unwrap();
        });
        assert!(store.get_clusters(24, 0.5).await.unwrap().is_empty());
        assert!(signalled.load(std::sync::atomic::Ordering::SeqCst));
    }
}
