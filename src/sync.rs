//! Vector synchronization: recent article embeddings into the vector store.

use crate::metric_names::{SYNC_ERRORS, SYNC_SYNCED};
use crate::{Clock, RefreshError};
use chrono::Duration;
use std::sync::Arc;
use std::time::Instant;
use store::{Article, ArticleRepository};
use vector::{Embedding, VectorMetadata, VectorStore};

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub errors: usize,
}

/// Pushes every recently seen article with a valid embedding into the vector store.
pub struct VectorSynchronizer {
    articles: Arc<dyn ArticleRepository>,
    vectors: Arc<dyn VectorStore>,
    dimensions: usize,
    window_hours: i64,
    clock: Clock,
}

impl VectorSynchronizer {
    pub fn new(
        articles: Arc<dyn ArticleRepository>,
        vectors: Arc<dyn VectorStore>,
        dimensions: usize,
        window_hours: i64,
        clock: Clock,
    ) -> Self {
        Self {
            articles,
            vectors,
            dimensions,
            window_hours,
            clock,
        }
    }

    /// One pass over articles last seen within the sync window.
    ///
    /// Items are independent: a bad embedding or a failed store call is counted
    /// in [`SyncReport::errors`] and the pass moves on. Only failing to read the
    /// article list is an error.
    pub async fn run(&self) -> Result<SyncReport, RefreshError> {
        let started = Instant::now();
        let cutoff = (self.clock)() - Duration::hours(self.window_hours);
        let articles = self.articles.recent_articles(cutoff, None).await?;

        let mut report = SyncReport::default();
        for article in &articles {
            if self.sync_one(article).await {
                report.synced += 1;
            } else {
                report.errors += 1;
            }
        }

        metrics::counter!(SYNC_SYNCED).increment(report.synced as u64);
        metrics::counter!(SYNC_ERRORS).increment(report.errors as u64);
        tracing::info!(
            synced = report.synced,
            errors = report.errors,
            window_hours = self.window_hours,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "vector_sync"
        );
        Ok(report)
    }

    async fn sync_one(&self, article: &Article) -> bool {
        let Some(raw) = article.embedding.as_ref() else {
            return false;
        };
        let embedding = match Embedding::decode(raw, self.dimensions) {
            Ok(embedding) => embedding,
            Err(err) => {
                tracing::warn!(news_id = article.id, error = %err, "vector_sync_rejected");
                return false;
            }
        };
        let metadata = VectorMetadata {
            title: article.title.clone(),
            url: article.url.clone(),
            source_url: article.source_url.clone(),
        };
        match self
            .vectors
            .store_vector(article.id, &embedding, metadata, article.last_seen_at)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(news_id = article.id, "vector_sync_declined");
                false
            }
            Err(err) => {
                tracing::warn!(news_id = article.id, error = %err, "vector_sync_failure");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};
    use store::NewsStore;
    use vector::{InMemoryVectorStore, VectorStoreConfig};

    fn article(id: i64, last_seen_at: DateTime<Utc>, embedding: Option<Value>) -> Article {
        Article {
            id,
            title: format!("story {id}"),
            summary: None,
            url: format!("https://news.example/{id}"),
            source_url: "https://news.example".into(),
            first_seen_at: last_seen_at,
            last_seen_at,
            created_at: last_seen_at,
            updated_at: last_seen_at,
            hit_count: 1,
            embedding,
        }
    }

    fn vectors_at(now: DateTime<Utc>) -> Arc<InMemoryVectorStore> {
        let cfg = VectorStoreConfig::new(3, Duration::hours(24));
        Arc::new(InMemoryVectorStore::new(cfg).with_clock(move || now))
    }

    fn synchronizer(
        store: &NewsStore,
        vectors: &Arc<InMemoryVectorStore>,
        now: DateTime<Utc>,
    ) -> VectorSynchronizer {
        VectorSynchronizer::new(
            Arc::new(store.clone()),
            Arc::clone(vectors) as Arc<dyn VectorStore>,
            3,
            24,
            Arc::new(move || now),
        )
    }

    #[tokio::test]
    async fn counts_valid_and_rejected_items() {
        let now = Utc::now();
        let store = NewsStore::in_memory();
        store.upsert_article(&article(1, now, Some(json!([0.1, 0.2, 0.3])))).unwrap();
        store.upsert_article(&article(2, now, Some(json!("[0.3,0.2,0.1]")))).unwrap();
        store.upsert_article(&article(3, now, Some(json!([0.1, 0.2])))).unwrap();
        store.upsert_article(&article(4, now, Some(json!([0.1, "x", 0.3])))).unwrap();
        store.upsert_article(&article(5, now, Some(json!({"v": 1})))).unwrap();
        // Outside the window: not read at all.
        let stale = now - Duration::hours(30);
        store.upsert_article(&article(6, stale, Some(json!([1, 1, 1])))).unwrap();

        let vectors = vectors_at(now);
        let report = synchronizer(&store, &vectors, now).run().await.unwrap();

        assert_eq!(report, SyncReport { synced: 2, errors: 3 });
        assert!(vectors.get_vector(1).await.unwrap().is_some());
        assert!(vectors.get_vector(2).await.unwrap().is_some());
        assert!(vectors.get_vector(3).await.unwrap().is_none());
        assert!(vectors.get_vector(6).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stored_metadata_is_a_snapshot() {
        let now = Utc::now();
        let store = NewsStore::in_memory();
        store.upsert_article(&article(7, now, Some(json!([1.0, 0.0, 0.0])))).unwrap();
        let vectors = vectors_at(now);

        synchronizer(&store, &vectors, now).run().await.unwrap();
        let record = vectors.get_vector(7).await.unwrap().unwrap();
        assert_eq!(record.metadata.title, "story 7");
        assert_eq!(record.metadata.url, "https://news.example/7");
        assert_eq!(record.last_seen_at, now);
    }
}
