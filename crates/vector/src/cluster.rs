//! Threshold cluster partition over the neighbour index.

use crate::ann::AnnIndex;
use crate::{AnnError, ArticleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A cluster member as reported by the vector store.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ClusterHit {
    pub article_id: ArticleId,
    /// Similarity to the cluster seed; the seed itself carries 1.0.
    pub similarity: f32,
}

/// Cluster id to members, seed first.
pub type ClusterPartition = BTreeMap<u32, Vec<ClusterHit>>;

/// A record eligible for clustering.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub id: ArticleId,
    pub last_seen_at: DateTime<Utc>,
}

/// Greedy seed clustering.
///
/// Candidates are visited newest first (ties by id). Each candidate not yet
/// assigned becomes a seed and claims every other unassigned candidate whose
/// similarity to it is at least `min_similarity`. Seeds that claim nobody are
/// dropped, so every returned cluster has two or more members.
pub fn partition(
    index: &AnnIndex,
    candidates: &[Candidate],
    min_similarity: f32,
) -> Result<ClusterPartition, AnnError> {
    let mut order: Vec<Candidate> = candidates.to_vec();
    order.sort_by(|a, b| {
        b.last_seen_at
            .cmp(&a.last_seen_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let eligible: HashSet<ArticleId> = order.iter().map(|c| c.id).collect();
    let mut assigned: HashSet<ArticleId> = HashSet::with_capacity(order.len());
    let mut clusters = ClusterPartition::new();

    for seed in &order {
        if assigned.contains(&seed.id) {
            continue;
        }
        let Some(seed_vector) = index.get(seed.id) else {
            continue;
        };

        let members: Vec<ClusterHit> = index
            .neighbours_within(seed_vector, min_similarity)?
            .into_iter()
            .filter(|n| n.id != seed.id && eligible.contains(&n.id) && !assigned.contains(&n.id))
            .map(|n| ClusterHit {
                article_id: n.id,
                similarity: n.similarity,
            })
            .collect();
        if members.is_empty() {
            continue;
        }

        let cluster_id = clusters.len() as u32;
        assigned.insert(seed.id);
        let mut hits = Vec::with_capacity(members.len() + 1);
        hits.push(ClusterHit {
            article_id: seed.id,
            similarity: 1.0,
        });
        for hit in members {
            assigned.insert(hit.article_id);
            hits.push(hit);
        }
        clusters.insert(cluster_id, hits);
    }

    Ok(clusters)
}
