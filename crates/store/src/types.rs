use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary key of an article row.
pub type ArticleId = i64;

/// Identifier of one cluster inside a partition.
pub type ClusterId = u32;

/// A crawled news article as the crawler persisted it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub url: String,
    pub source_url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub hit_count: u64,
    /// Raw embedding column. Shape is not checked here; see `vector::Embedding::decode`.
    #[serde(default)]
    pub embedding: Option<serde_json::Value>,
}

impl Article {
    /// Whether the embedding column holds anything at all (JSON `null` counts as absent).
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|value| !value.is_null())
    }
}

/// Cache key: a `(window hours, similarity threshold)` pair.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CacheKey {
    pub hours: u32,
    pub min_similarity: f32,
}

impl CacheKey {
    pub fn new(hours: u32, min_similarity: f32) -> Self {
        Self {
            hours,
            min_similarity,
        }
    }

    /// Row key used by the backends, e.g. `48:0.60`.
    ///
    /// Thresholds are rounded to two decimals so `0.6` and `0.6000001` share a row.
    pub fn storage_key(&self) -> String {
        format!("{}:{:.2}", self.hours, self.min_similarity)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}h@{:.2}", self.hours, self.min_similarity)
    }
}

/// One article inside a cached cluster, enriched with its display fields.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClusterMember {
    pub id: ArticleId,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    pub url: String,
    pub source_url: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub hit_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Similarity to the cluster seed, in `[0, 1]`.
    pub similarity: f32,
    pub cluster_id: ClusterId,
}

impl ClusterMember {
    pub fn from_article(article: &Article, similarity: f32, cluster_id: ClusterId) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            summary: article.summary.clone(),
            url: article.url.clone(),
            source_url: article.source_url.clone(),
            first_seen_at: article.first_seen_at,
            last_seen_at: article.last_seen_at,
            hit_count: article.hit_count,
            created_at: article.created_at,
            updated_at: article.updated_at,
            similarity,
            cluster_id,
        }
    }
}

/// Cluster id to ordered members. `BTreeMap` keeps the serialized form stable.
pub type ClusterMap = BTreeMap<ClusterId, Vec<ClusterMember>>;

/// One point of the 2-D projection.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProjectionPoint {
    pub id: ArticleId,
    pub title: String,
    pub url: String,
    pub source_url: String,
    pub last_seen_at: DateTime<Utc>,
    pub x: f32,
    pub y: f32,
    pub cluster_id: Option<ClusterId>,
    pub opacity: f32,
}

/// A cache row: key, refresh timestamp and the serialized payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,
    pub payload: T,
}

pub type ClusterCacheEntry = CacheEntry<ClusterMap>;
pub type ProjectionCacheEntry = CacheEntry<Vec<ProjectionPoint>>;

/// A pending cache write.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheWrite {
    Clusters(ClusterCacheEntry),
    Projection(ProjectionCacheEntry),
}

/// Cache rows queued during a sweep and committed together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheWrites {
    writes: Vec<CacheWrite>,
}

impl CacheWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_clusters(&mut self, key: CacheKey, payload: ClusterMap, created_at: DateTime<Utc>) {
        self.writes.push(CacheWrite::Clusters(CacheEntry {
            key,
            created_at,
            payload,
        }));
    }

    pub fn put_projection(
        &mut self,
        key: CacheKey,
        payload: Vec<ProjectionPoint>,
        created_at: DateTime<Utc>,
    ) {
        self.writes.push(CacheWrite::Projection(CacheEntry {
            key,
            created_at,
            payload,
        }));
    }

    /// Move every write from `other` into `self`, keeping order.
    pub fn extend(&mut self, other: CacheWrites) {
        self.writes.extend(other.writes);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CacheWrite> {
        self.writes.iter()
    }
}

impl IntoIterator for CacheWrites {
    type Item = CacheWrite;
    type IntoIter = std::vec::IntoIter<CacheWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_rounds_threshold() {
        assert_eq!(CacheKey::new(24, 0.5).storage_key(), "24:0.50");
        assert_eq!(CacheKey::new(72, 0.7).storage_key(), "72:0.70");
        assert_eq!(
            CacheKey::new(48, 0.6).storage_key(),
            CacheKey::new(48, 0.600_000_1).storage_key()
        );
    }

    #[test]
    fn cluster_map_keys_survive_json() {
        let mut map = ClusterMap::new();
        map.insert(3, Vec::new());
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"3":[]}"#);
        let back: ClusterMap = serde_json::from_str(&json).unwrap();
        assert!(back.contains_key(&3));
    }
}
