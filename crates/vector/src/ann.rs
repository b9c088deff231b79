//! Neighbour index over article vectors using HNSW.
//!
//! Small collections are scanned exactly; once the collection reaches
//! `min_vectors_for_ann` the index answers from an HNSW graph instead.
//! The graph is rebuilt lazily, only after writes have invalidated it.

use crate::ArticleId;
use hnsw_rs::prelude::{DistCosine, Hnsw};
use std::collections::HashMap;

/// Configuration for neighbour index construction.
#[derive(Debug, Clone, Copy)]
pub struct AnnConfig {
    /// Number of neighbors per node. Default: 16
    pub m: usize,
    /// Candidate list size during construction. Default: 200
    pub ef_construction: usize,
    /// Candidate list size during search. Default: 64
    pub ef_search: usize,
    /// Upper bound on neighbours pulled from the graph per query. Default: 256
    pub max_results: usize,
    /// Whether to use HNSW at all. Default: true
    pub enabled: bool,
    /// Below this many vectors, exact scan is used even if enabled. Default: 1000
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            max_results: 256,
            enabled: true,
            min_vectors_for_ann: 1000,
        }
    }
}

impl AnnConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

/// A neighbour returned by the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub id: ArticleId,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub similarity: f32,
}

/// Error type for index operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AnnError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Neighbour index keyed by article id.
pub struct AnnIndex {
    config: AnnConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    slots: HashMap<ArticleId, usize>,
    ids: Vec<ArticleId>,
    vectors: Vec<Vec<f32>>,
    built: bool,
}

impl AnnIndex {
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            slots: HashMap::new(),
            ids: Vec::new(),
            vectors: Vec::new(),
            built: false,
        }
    }

    /// Insert a vector, replacing any previous vector stored for `id`.
    ///
    /// Re-storing an identical vector keeps the built graph.
    pub fn upsert(&mut self, id: ArticleId, vector: Vec<f32>) -> Result<(), AnnError> {
        self.check_dimension(vector.len())?;
        match self.slots.get(&id) {
            Some(&slot) if self.vectors[slot] == vector => return Ok(()),
            Some(&slot) => self.vectors[slot] = vector,
            None => {
                self.slots.insert(id, self.vectors.len());
                self.ids.push(id);
                self.vectors.push(vector);
            }
        }
        self.built = false;
        Ok(())
    }

    /// Drop every id for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(ArticleId) -> bool) {
        let before = self.ids.len();
        let mut ids = Vec::with_capacity(before);
        let mut vectors = Vec::with_capacity(before);
        for (id, vector) in self.ids.drain(..).zip(self.vectors.drain(..)) {
            if keep(id) {
                ids.push(id);
                vectors.push(vector);
            }
        }
        if ids.len() != before {
            self.built = false;
        }
        self.slots = ids.iter().enumerate().map(|(slot, &id)| (id, slot)).collect();
        self.ids = ids;
        self.vectors = vectors;
    }

    pub fn get(&self, id: ArticleId) -> Option<&[f32]> {
        self.slots.get(&id).map(|&slot| self.vectors[slot].as_slice())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Every stored vector with cosine similarity `>= min_similarity` to `query`,
    /// most similar first (ties by id).
    ///
    /// In HNSW mode the answer is approximate and bounded by `max_results`.
    pub fn neighbours_within(
        &self,
        query: &[f32],
        min_similarity: f32,
    ) -> Result<Vec<Neighbour>, AnnError> {
        self.check_dimension(query.len())?;

        let mut hits: Vec<Neighbour> = match self.hnsw.as_ref() {
            Some(hnsw) if self.built && self.config.should_use_ann(self.vectors.len()) => hnsw
                .search(query, self.config.max_results, self.config.ef_search)
                .into_iter()
                .filter_map(|n| {
                    let slot = n.get_origin_id();
                    self.ids.get(slot).map(|&id| Neighbour {
                        id,
                        similarity: cosine_similarity(query, &self.vectors[slot]),
                    })
                })
                .filter(|n| n.similarity >= min_similarity)
                .collect(),
            _ => self
                .ids
                .iter()
                .zip(&self.vectors)
                .map(|(&id, vector)| Neighbour {
                    id,
                    similarity: cosine_similarity(query, vector),
                })
                .filter(|n| n.similarity >= min_similarity)
                .collect(),
        };

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(hits)
    }

    /// Build the HNSW graph if writes invalidated it and the collection is large enough.
    pub fn build_if_needed(&mut self) {
        if self.built {
            return;
        }
        self.built = true;
        if !self.config.should_use_ann(self.vectors.len()) {
            self.hnsw = None;
            return;
        }

        let nb_elem = self.vectors.len();
        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize);
        let hnsw = Hnsw::<f32, DistCosine>::new(
            self.config.m,
            nb_elem,
            nb_layer,
            self.config.ef_construction,
            DistCosine {},
        );
        let data_for_insertion: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, vec)| (vec, slot))
            .collect();
        hnsw.parallel_insert(&data_for_insertion);
        tracing::debug!(vectors = nb_elem, layers = nb_layer, "hnsw_rebuilt");
        self.hnsw = Some(hnsw);
    }

    fn check_dimension(&self, got: usize) -> Result<(), AnnError> {
        if got != self.dimension {
            return Err(AnnError::DimensionMismatch {
                expected: self.dimension,
                got,
            });
        }
        Ok(())
    }
}

/// Cosine similarity; zero vectors are similar to nothing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
