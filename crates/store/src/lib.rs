//! # Newsmap Store
//!
//! Relational side of the newsmap refresh pipeline: article records plus the
//! two derived cache tables (cluster cache and projection cache), both keyed
//! by a `(hours, min_similarity)` pair.
//!
//! ## Core Features
//!
//! - **Pluggable Backends**: every table lives behind the [`StoreBackend`]
//!   trait. An in-memory backend is provided for tests, and a redb backend
//!   (feature `backend-redb`, on by default) for persistent storage.
//! - **Replace-on-recompute caches**: cache rows are always written whole;
//!   [`NewsStore::apply`] lands a [`CacheWrites`] batch in one backend
//!   transaction.
//! - **Async seams**: the pipeline talks to [`ArticleRepository`] and
//!   [`CacheRepository`]. [`NewsStore`] implements both by moving each backend
//!   call onto Tokio's blocking pool.
//!
//! Article embeddings are kept exactly as the crawler wrote them (raw JSON).
//! Nothing in this crate interprets them beyond "present or absent".
//!
//! ## Example Usage
//!
//! ```
//! use store::{CacheKey, CacheWrites, NewsStore};
//! use chrono::Utc;
//!
//! let store = NewsStore::in_memory();
//! let key = CacheKey::new(24, 0.5);
//!
//! let mut writes = CacheWrites::new();
//! writes.put_projection(key, Vec::new(), Utc::now());
//! store.apply(writes).unwrap();
//!
//! let entry = store.load_projection_entry(key).unwrap().unwrap();
//! assert!(entry.payload.is_empty());
//! ```

mod backend;
mod error;
mod repository;
mod types;

pub use backend::{BackendConfig, InMemoryBackend, StoreBackend, Table, WriteOp};
#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use error::StoreError;
pub use repository::{ArticleRepository, CacheRepository};
pub use types::{
    Article, ArticleId, CacheEntry, CacheKey, CacheWrite, CacheWrites, ClusterCacheEntry,
    ClusterId, ClusterMap, ClusterMember, ProjectionCacheEntry, ProjectionPoint,
};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// Handle over a store backend. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct NewsStore {
    backend: Arc<dyn StoreBackend>,
}

impl NewsStore {
    /// Build the configured backend and wrap it.
    pub fn open(cfg: &BackendConfig) -> Result<Self, StoreError> {
        Ok(Self::with_backend(cfg.build()?))
    }

    /// Wrap an already constructed backend (dependency injection for tests).
    pub fn with_backend(backend: Box<dyn StoreBackend>) -> Self {
        Self {
            backend: Arc::from(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(InMemoryBackend::new()))
    }

    /// Insert or replace an article, keeping the recency index in step.
    pub fn upsert_article(&self, article: &Article) -> Result<(), StoreError> {
        let key = article.id.to_string();
        let payload = serde_json::to_vec(article).map_err(StoreError::encode)?;
        let mut ops = self.unindex_ops(article.id)?;
        if article.has_embedding() {
            ops.push(WriteOp::Put(
                Table::ArticlesBySeen,
                seen_key(article.last_seen_at, article.id),
                Vec::new(),
            ));
        }
        ops.push(WriteOp::Put(Table::Articles, key, payload));
        self.backend.write_batch(ops)
    }

    pub fn delete_article(&self, id: ArticleId) -> Result<(), StoreError> {
        let mut ops = self.unindex_ops(id)?;
        ops.push(WriteOp::Delete(Table::Articles, id.to_string()));
        self.backend.write_batch(ops)
    }

    /// Articles seen at or after `cutoff` that carry an embedding, newest first.
    ///
    /// Ties on `last_seen_at` are broken by ascending id so the order is stable
    /// across calls. `limit` caps the result after ordering. Only rows inside
    /// the window are read.
    pub fn load_recent(
        &self,
        cutoff: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Article>, StoreError> {
        // Keys come newest first. Once `limit` ids are held, keep reading only
        // while the millisecond matches the last one taken, so ties and
        // sub-millisecond order are settled by the sort below.
        let mut ids: Vec<ArticleId> = Vec::new();
        let mut last_millis = String::new();
        self.backend
            .keys_desc_from(Table::ArticlesBySeen, &seen_floor(cutoff), &mut |key| {
                let Some((millis, id)) = key.split_once(':') else {
                    return Ok(true);
                };
                if limit.is_some_and(|limit| ids.len() >= limit) && millis != last_millis {
                    return Ok(false);
                }
                if let Ok(id) = id.parse() {
                    ids.push(id);
                    last_millis.clear();
                    last_millis.push_str(millis);
                }
                Ok(true)
            })?;

        let mut articles = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(data) = self.backend.get(Table::Articles, &id.to_string())? {
                let article: Article = decode(&data)?;
                if article.last_seen_at >= cutoff && article.has_embedding() {
                    articles.push(article);
                }
            }
        }

        articles.sort_by(|a, b| {
            b.last_seen_at
                .cmp(&a.last_seen_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            articles.truncate(limit);
        }
        Ok(articles)
    }

    /// Fetch the given ids in one pass. Unknown ids are simply absent from the map.
    pub fn load_by_ids(
        &self,
        ids: &[ArticleId],
    ) -> Result<HashMap<ArticleId, Article>, StoreError> {
        let mut found = HashMap::with_capacity(ids.len());
        for &id in ids {
            if found.contains_key(&id) {
                continue;
            }
            if let Some(data) = self.backend.get(Table::Articles, &id.to_string())? {
                found.insert(id, decode::<Article>(&data)?);
            }
        }
        Ok(found)
    }

    pub fn load_cluster_entry(
        &self,
        key: CacheKey,
    ) -> Result<Option<ClusterCacheEntry>, StoreError> {
        self.load_entry(Table::ClusterCache, key)
    }

    pub fn load_projection_entry(
        &self,
        key: CacheKey,
    ) -> Result<Option<ProjectionCacheEntry>, StoreError> {
        self.load_entry(Table::ProjectionCache, key)
    }

    /// Write every queued cache row in a single backend batch.
    pub fn apply(&self, writes: CacheWrites) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }
        let mut entries = Vec::with_capacity(writes.len());
        for write in writes {
            let (table, key, payload) = match &write {
                CacheWrite::Clusters(entry) => (
                    Table::ClusterCache,
                    entry.key,
                    serde_json::to_vec(entry).map_err(StoreError::encode)?,
                ),
                CacheWrite::Projection(entry) => (
                    Table::ProjectionCache,
                    entry.key,
                    serde_json::to_vec(entry).map_err(StoreError::encode)?,
                ),
            };
            entries.push((table, key.storage_key(), payload));
        }
        let count = entries.len();
        self.backend.batch_put(entries)?;
        self.backend.flush()?;
        tracing::debug!(rows = count, "cache_batch_committed");
        Ok(())
    }

    /// Deletes for the index key of the stored row, if it has one.
    fn unindex_ops(&self, id: ArticleId) -> Result<Vec<WriteOp>, StoreError> {
        let Some(data) = self.backend.get(Table::Articles, &id.to_string())? else {
            return Ok(Vec::new());
        };
        match decode::<Article>(&data) {
            Ok(previous) => Ok(vec![WriteOp::Delete(
                Table::ArticlesBySeen,
                seen_key(previous.last_seen_at, id),
            )]),
            Err(err) => {
                tracing::warn!(news_id = id, error = %err, "article_row_undecodable");
                Ok(Vec::new())
            }
        }
    }

    fn load_entry<T: DeserializeOwned>(
        &self,
        table: Table,
        key: CacheKey,
    ) -> Result<Option<T>, StoreError> {
        match self.backend.get(table, &key.storage_key())? {
            Some(data) => Ok(Some(decode(&data)?)),
            None => Ok(None),
        }
    }
}

/// Zero padding makes byte order match time order. Pre-epoch instants clamp to 0.
fn seen_floor(at: DateTime<Utc>) -> String {
    format!("{:020}", at.timestamp_millis().max(0))
}

fn seen_key(at: DateTime<Utc>, id: ArticleId) -> String {
    format!("{}:{id}", seen_floor(at))
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(data).map_err(StoreError::decode)
}
