//! Fuzzy k-nearest-neighbour graph under cosine distance.
//!
//! Each point gets a local distance scale (`rho`, `sigma`) so that the sum of its
//! neighbour memberships equals `log2(k)`. Directed memberships are combined with
//! the probabilistic union `a + b - a * b`, yielding a symmetric weighted graph.

use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use std::collections::BTreeMap;

const SMOOTH_K_TOLERANCE: f32 = 1e-5;
const SMOOTH_K_STEPS: usize = 64;
const MIN_K_DIST_SCALE: f32 = 1e-3;

/// Directed graph edge; every undirected pair appears in both directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Edge {
    pub head: usize,
    pub tail: usize,
    pub weight: f32,
}

/// Scale rows to unit length so cosine distance becomes `1 - dot`.
/// Zero rows stay zero and end up at distance 1 from everything.
pub(crate) fn normalise_rows(mut data: Array2<f32>) -> Array2<f32> {
    for mut row in data.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    data
}

fn cosine_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    (1.0 - a.dot(&b)).max(0.0)
}

/// Exact `k` nearest neighbours of every row, nearest first (ties by index).
///
/// Rows are scanned in parallel; the ordered collect keeps the output
/// independent of thread scheduling.
pub(crate) fn nearest_neighbours(data: &Array2<f32>, k: usize) -> Vec<Vec<(usize, f32)>> {
    let n = data.nrows();
    (0..n)
        .into_par_iter()
        .map(|i| {
            let row = data.row(i);
            let mut dists: Vec<(usize, f32)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (j, cosine_distance(row, data.row(j))))
                .collect();
            dists.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            dists.truncate(k);
            dists
        })
        .collect()
}

/// Local connectivity (`rho`) and bandwidth (`sigma`) for one point.
///
/// `dists` must be sorted ascending.
fn smooth_distances(dists: &[f32], target: f32, global_mean: f32) -> (f32, f32) {
    let rho = dists.iter().copied().find(|&d| d > 0.0).unwrap_or(0.0);

    let (mut lo, mut hi, mut sigma) = (0.0_f32, f32::INFINITY, 1.0_f32);
    for _ in 0..SMOOTH_K_STEPS {
        let psum: f32 = dists.iter().map(|&d| membership(d, rho, sigma)).sum();
        if (psum - target).abs() < SMOOTH_K_TOLERANCE {
            break;
        }
        if psum > target {
            hi = sigma;
            sigma = (lo + hi) / 2.0;
        } else {
            lo = sigma;
            sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let local_mean = if dists.is_empty() {
        0.0
    } else {
        dists.iter().sum::<f32>() / dists.len() as f32
    };
    let floor = if rho > 0.0 { local_mean } else { global_mean };
    (rho, sigma.max(MIN_K_DIST_SCALE * floor))
}

fn membership(dist: f32, rho: f32, sigma: f32) -> f32 {
    let d = dist - rho;
    if d <= 0.0 {
        1.0
    } else if sigma > 0.0 {
        (-d / sigma).exp()
    } else {
        0.0
    }
}

/// Symmetric fuzzy graph, edges sorted by `(head, tail)`.
pub(crate) fn fuzzy_graph(knn: &[Vec<(usize, f32)>]) -> Vec<Edge> {
    let k = knn.first().map_or(0, Vec::len);
    if k == 0 {
        return Vec::new();
    }
    let target = (k as f32).log2();
    let total: usize = knn.iter().map(Vec::len).sum();
    let global_mean = knn.iter().flatten().map(|&(_, d)| d).sum::<f32>() / total as f32;

    let mut directed: BTreeMap<(usize, usize), f32> = BTreeMap::new();
    for (i, neighbours) in knn.iter().enumerate() {
        let dists: Vec<f32> = neighbours.iter().map(|&(_, d)| d).collect();
        let (rho, sigma) = smooth_distances(&dists, target, global_mean);
        for &(j, d) in neighbours {
            let w = membership(d, rho, sigma);
            if w > 0.0 {
                directed.insert((i, j), w);
            }
        }
    }

    let mut edges = Vec::with_capacity(directed.len() * 2);
    for (&(i, j), &w_ij) in &directed {
        let w_ji = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let weight = w_ij + w_ji - w_ij * w_ji;
        edges.push(Edge {
            head: i,
            tail: j,
            weight,
        });
        if w_ji == 0.0 {
            edges.push(Edge {
                head: j,
                tail: i,
                weight,
            });
        }
    }
    edges.sort_by(|a, b| a.head.cmp(&b.head).then_with(|| a.tail.cmp(&b.tail)));
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rows_are_unit_length() {
        let data = normalise_rows(array![[3.0, 4.0], [0.0, 0.0]]);
        assert!((data[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((data[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(data[[1, 0]], 0.0);
    }

    #[test]
    fn neighbours_are_nearest_first() {
        let data = normalise_rows(array![[1.0, 0.0], [0.0, 1.0], [0.9, 0.1], [1.0, 0.0]]);
        let knn = nearest_neighbours(&data, 2);
        assert_eq!(knn.len(), 4);
        let first: Vec<usize> = knn[0].iter().map(|&(j, _)| j).collect();
        assert_eq!(first, vec![3, 2]);
        assert_eq!(knn[0][0].1, 0.0);
    }

    #[test]
    fn memberships_sum_to_log2_k() {
        let dists = [0.1, 0.2, 0.3, 0.5];
        let (rho, sigma) = smooth_distances(&dists, 2.0, 0.3);
        assert_eq!(rho, 0.1);
        let psum: f32 = dists.iter().map(|&d| membership(d, rho, sigma)).sum();
        assert!((psum - 2.0).abs() < 1e-3);
    }

    #[test]
    fn graph_is_symmetric() {
        let data = normalise_rows(array![
            [1.0, 0.0, 0.0],
            [0.9, 0.1, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.8, 0.2],
            [0.0, 0.0, 1.0]
        ]);
        let edges = fuzzy_graph(&nearest_neighbours(&data, 2));
        assert!(!edges.is_empty());
        for e in &edges {
            let back = edges
                .iter()
                .find(|r| r.head == e.tail && r.tail == e.head)
                .expect("reverse edge");
            assert_eq!(back.weight, e.weight);
            assert!(e.weight > 0.0 && e.weight <= 1.0);
        }
    }
}
