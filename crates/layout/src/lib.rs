//! # Newsmap Layout
//!
//! Visual placement for the news map.
//!
//! [`project`] reduces a set of high-dimensional embeddings to 2-D points with a
//! neighbour-graph layout in the UMAP family: build a fuzzy k-nearest-neighbour
//! graph under cosine distance, then optimise a low-dimensional embedding of
//! that graph with seeded stochastic gradient descent. Identical inputs and an
//! identical [`LayoutConfig`] give identical coordinates.
//!
//! [`recency_opacity`] maps article age to the display opacity used by the map.
//!
//! ```
//! use layout::{project, LayoutConfig};
//!
//! let rows = vec![
//!     vec![1.0, 0.0, 0.0],
//!     vec![0.9, 0.1, 0.0],
//!     vec![0.0, 1.0, 0.0],
//!     vec![0.0, 0.9, 0.1],
//! ];
//! let coords = project(&rows, &LayoutConfig::default()).unwrap();
//! assert_eq!(coords.dim(), (4, 2));
//! ```

mod fuzzy;
mod opacity;
mod umap;

pub use opacity::{recency_opacity, FADED_AFTER_HOURS, FRESH_FOR_HOURS, MAX_OPACITY, MIN_OPACITY};
pub use umap::{curve_parameters, project, LayoutConfig};

use thiserror::Error;

/// Errors raised while computing a layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("need at least 2 points to lay out, got {0}")]
    TooFewPoints(usize),
    #[error("embeddings have zero dimensions")]
    EmptyVector,
    #[error("row {row} has {got} dimensions, expected {expected}")]
    RaggedInput {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("layout diverged: non-finite coordinate at row {0}")]
    NonFinite(usize),
}
