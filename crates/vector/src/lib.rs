//! # Newsmap Vector
//!
//! The vector store adapter used by the refresh pipeline.
//!
//! - [`Embedding::decode`] is the single typed boundary between a raw
//!   embedding column and a validated fixed-length `f32` vector.
//! - [`VectorStore`] is the capability surface the pipeline relies on:
//!   store a vector with metadata, read it back, and ask for a cluster
//!   partition over a `(hours, min_similarity)` window.
//! - [`InMemoryVectorStore`] implements it with TTL'd records and an
//!   [`AnnIndex`] that switches from exact scan to HNSW as the collection grows.
//!
//! ```
//! use vector::{Embedding, InMemoryVectorStore, VectorMetadata, VectorStore, VectorStoreConfig};
//! use chrono::{Duration, Utc};
//!
//! # tokio_test_block(async {
//! let store = InMemoryVectorStore::new(VectorStoreConfig::new(2, Duration::hours(24)));
//! let meta = VectorMetadata { title: "a".into(), url: "u".into(), source_url: "s".into() };
//! let e = Embedding::from_vec(vec![1.0, 0.0], 2).unwrap();
//! assert!(store.store_vector(1, &e, meta, Utc::now()).await.unwrap());
//! # });
//! # fn tokio_test_block<F: std::future::Future<Output = ()>>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod ann;
mod cluster;
mod embedding;
mod store;

pub use ann::{AnnConfig, AnnError, AnnIndex};
pub use cluster::{partition, Candidate, ClusterHit, ClusterPartition};
pub use embedding::{DecodeError, Embedding};
pub use store::{InMemoryVectorStore, VectorMetadata, VectorRecord, VectorStore, VectorStoreConfig};

use thiserror::Error;

/// Article identifier shared with the relational store.
pub type ArticleId = i64;

/// Errors raised by vector store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorError {
    #[error("embedding rejected: {0}")]
    Decode(#[from] DecodeError),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("index error: {0}")]
    Index(#[from] AnnError),
    #[error("vector backend error: {0}")]
    Backend(String),
}

impl VectorError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    fn poisoned() -> Self {
        Self::Backend("poisoned lock".into())
    }
}
