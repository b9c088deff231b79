//! Seeded 2-D layout of a fuzzy neighbour graph.

use crate::fuzzy::{self, Edge};
use crate::LayoutError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

const GRADIENT_CLIP: f32 = 4.0;
const INIT_RANGE: f32 = 10.0;
const CURVE_SAMPLES: usize = 300;

/// Layout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Neighbourhood size; clamped to `points - 1`. Default: 15
    pub n_neighbors: usize,
    /// Optimisation epochs. Default: 200
    pub n_epochs: usize,
    /// Seed for initial placement and negative sampling. Default: 42
    pub seed: u64,
    /// How tightly points may pack. Default: 0.1
    pub min_dist: f32,
    /// Scale of the embedded clusters. Default: 1.0
    pub spread: f32,
    /// Initial SGD step; decays linearly to zero. Default: 1.0
    pub learning_rate: f32,
    /// Negative samples per positive sample. Default: 5
    pub negative_sample_rate: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            n_epochs: 200,
            seed: 42,
            min_dist: 0.1,
            spread: 1.0,
            learning_rate: 1.0,
            negative_sample_rate: 5,
        }
    }
}

impl LayoutConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    pub fn with_n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }
}

/// Fit `a`, `b` of the low-dimensional similarity curve `1 / (1 + a * d^(2b))`
/// to an offset exponential with the given `spread` and `min_dist`.
///
/// Least squares over `d` in `[0, 3 * spread]`, solved by pattern search.
/// For the defaults this gives roughly `a = 1.577`, `b = 0.895`.
pub fn curve_parameters(spread: f32, min_dist: f32) -> (f32, f32) {
    let spread = f64::from(spread);
    let min_dist = f64::from(min_dist);
    let samples: Vec<(f64, f64)> = (0..CURVE_SAMPLES)
        .map(|i| {
            let x = i as f64 * 3.0 * spread / (CURVE_SAMPLES - 1) as f64;
            let y = if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            };
            (x, y)
        })
        .collect();
    let loss = |a: f64, b: f64| -> f64 {
        samples
            .iter()
            .map(|&(x, y)| {
                let r = 1.0 / (1.0 + a * x.powf(2.0 * b)) - y;
                r * r
            })
            .sum()
    };

    let (mut a, mut b, mut step) = (1.0_f64, 1.0_f64, 0.5_f64);
    let mut best = loss(a, b);
    for _ in 0..10_000 {
        if step < 1e-6 {
            break;
        }
        let moved = [(step, 0.0), (-step, 0.0), (0.0, step), (0.0, -step)]
            .into_iter()
            .map(|(da, db)| (a + da, b + db))
            .filter(|&(na, nb)| na > 0.0 && nb > 0.0)
            .find_map(|(na, nb)| {
                let l = loss(na, nb);
                (l < best).then_some((na, nb, l))
            });
        match moved {
            Some((na, nb, l)) => {
                a = na;
                b = nb;
                best = l;
            }
            None => step *= 0.5,
        }
    }
    (a as f32, b as f32)
}

/// Project `rows` to 2-D. Row `i` of the result is the position of `rows[i]`.
///
/// Requires at least two rows of equal, non-zero length. The result depends
/// only on `rows` and `cfg`.
pub fn project<R: AsRef<[f32]>>(
    rows: &[R],
    cfg: &LayoutConfig,
) -> Result<Array2<f32>, LayoutError> {
    let n = rows.len();
    if n < 2 {
        return Err(LayoutError::TooFewPoints(n));
    }
    let dim = rows[0].as_ref().len();
    if dim == 0 {
        return Err(LayoutError::EmptyVector);
    }
    if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.as_ref().len() != dim) {
        return Err(LayoutError::RaggedInput {
            row,
            expected: dim,
            got: r.as_ref().len(),
        });
    }

    let data = fuzzy::normalise_rows(Array2::from_shape_fn((n, dim), |(i, j)| rows[i].as_ref()[j]));
    let k = cfg.n_neighbors.clamp(1, n - 1);
    let edges = fuzzy::fuzzy_graph(&fuzzy::nearest_neighbours(&data, k));
    let (a, b) = curve_parameters(cfg.spread, cfg.min_dist);

    let mut rng = fastrand::Rng::with_seed(cfg.seed);
    let mut coords: Vec<[f32; 2]> = (0..n)
        .map(|_| {
            [
                rng.f32() * 2.0 * INIT_RANGE - INIT_RANGE,
                rng.f32() * 2.0 * INIT_RANGE - INIT_RANGE,
            ]
        })
        .collect();
    optimise(&mut coords, &edges, a, b, cfg, &mut rng);

    if let Some(row) = coords.iter().position(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(LayoutError::NonFinite(row));
    }
    tracing::debug!(points = n, dim, neighbours = k, edges = edges.len(), "layout_projected");
    Ok(Array2::from_shape_fn((n, 2), |(i, d)| coords[i][d]))
}

fn clip(g: f32) -> f32 {
    g.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

fn dist_sq(p: [f32; 2], q: [f32; 2]) -> f32 {
    (p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2)
}

/// Attract along sampled edges, repel from random points; sequential so the
/// seeded RNG fully determines the result.
fn optimise(
    coords: &mut [[f32; 2]],
    edges: &[Edge],
    a: f32,
    b: f32,
    cfg: &LayoutConfig,
    rng: &mut fastrand::Rng,
) {
    let n = coords.len();
    let n_epochs = cfg.n_epochs as f32;
    let max_weight = edges.iter().map(|e| e.weight).fold(0.0_f32, f32::max);
    if cfg.n_epochs == 0 || max_weight <= 0.0 {
        return;
    }

    // Edges too weak to be sampled even once are dropped.
    let edges: Vec<&Edge> = edges
        .iter()
        .filter(|e| e.weight >= max_weight / n_epochs)
        .collect();
    let epochs_per_sample: Vec<f32> = edges.iter().map(|e| max_weight / e.weight).collect();
    let epochs_per_negative: Vec<f32> = epochs_per_sample
        .iter()
        .map(|&eps| eps / cfg.negative_sample_rate.max(1) as f32)
        .collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    for epoch in 0..cfg.n_epochs {
        let now = epoch as f32;
        let alpha = cfg.learning_rate * (1.0 - now / n_epochs);

        for (idx, edge) in edges.iter().enumerate() {
            if next_sample[idx] > now {
                continue;
            }
            let (i, j) = (edge.head, edge.tail);
            let mut current = coords[i];
            let mut other = coords[j];

            let d2 = dist_sq(current, other);
            let coeff = if d2 > 0.0 {
                -2.0 * a * b * d2.powf(b - 1.0) / (a * d2.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..2 {
                let grad = clip(coeff * (current[d] - other[d]));
                current[d] += grad * alpha;
                other[d] -= grad * alpha;
            }
            coords[j] = other;
            next_sample[idx] += epochs_per_sample[idx];

            if cfg.negative_sample_rate > 0 {
                let n_neg = ((now - next_negative[idx]) / epochs_per_negative[idx])
                    .floor()
                    .max(0.0) as usize;
                for _ in 0..n_neg {
                    let k = rng.usize(0..n);
                    if k == i {
                        continue;
                    }
                    let other = coords[k];
                    let d2 = dist_sq(current, other);
                    let coeff = if d2 > 0.0 {
                        2.0 * b / ((0.001 + d2) * (a * d2.powf(b) + 1.0))
                    } else {
                        0.0
                    };
                    for d in 0..2 {
                        let grad = if coeff > 0.0 {
                            clip(coeff * (current[d] - other[d]))
                        } else {
                            GRADIENT_CLIP
                        };
                        current[d] += grad * alpha;
                    }
                }
                next_negative[idx] += n_neg as f32 * epochs_per_negative[idx];
            }
            coords[i] = current;
        }
    }
}
