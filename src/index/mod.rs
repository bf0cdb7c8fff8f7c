//! Exact inner-product vector index over catalog embeddings.
//!
//! Vectors live in one row-major `n × d` matrix; row `i` is ordinal `i`. The index is
//! built once from a complete ordered set and never mutated afterwards, so a loaded
//! index can be shared across threads without locking.

pub mod build;
pub mod id_map;
pub mod storage;

use anyhow::Result;
use ndarray::{Array2, ArrayView1};

use crate::embedding::EmbeddingVector;

/// One ranked neighbor: similarity score and the row it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub score: f32,
    pub ordinal: usize,
}

/// A nearest-neighbor oracle over unit vectors.
pub trait NearestNeighbors: Send + Sync {
    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimensions(&self) -> usize;

    /// The `top_k` highest inner products, best first. Returns every vector
    /// when the index holds fewer than `top_k`.
    fn search(&self, query: &EmbeddingVector, top_k: usize) -> Result<Vec<Neighbor>>;
}

/// Brute-force exact index.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Build from an ordered vector set; position in `vectors` becomes the ordinal.
    pub fn build(vectors: &[EmbeddingVector]) -> Result<Self> {
        let first = vectors
            .first()
            .ok_or_else(|| anyhow::anyhow!("cannot build an index from zero vectors"))?;
        let dims = first.dimensions();

        let mut data = Vec::with_capacity(vectors.len() * dims);
        for (ordinal, v) in vectors.iter().enumerate() {
            anyhow::ensure!(
                v.dimensions() == dims,
                "vector {ordinal} has {} dimensions, expected {dims}",
                v.dimensions()
            );
            data.extend_from_slice(v.as_slice());
        }

        Self::from_raw(vectors.len(), dims, data)
    }

    /// Wrap an already-flattened row-major matrix.
    pub(crate) fn from_raw(rows: usize, dims: usize, data: Vec<f32>) -> Result<Self> {
        anyhow::ensure!(dims > 0, "index dimensions must be positive");
        let vectors = Array2::from_shape_vec((rows, dims), data)
            .map_err(|e| anyhow::anyhow!("vector payload does not fit {rows}x{dims}: {e}"))?;
        Ok(Self { vectors })
    }

    /// Row-major view of every stored vector.
    pub(crate) fn raw_data(&self) -> impl Iterator<Item = f32> + '_ {
        self.vectors.iter().copied()
    }
}

impl NearestNeighbors for FlatIndex {
    fn len(&self) -> usize {
        self.vectors.nrows()
    }

    fn dimensions(&self) -> usize {
        self.vectors.ncols()
    }

    fn search(&self, query: &EmbeddingVector, top_k: usize) -> Result<Vec<Neighbor>> {
        anyhow::ensure!(top_k >= 1, "top_k must be at least 1");
        anyhow::ensure!(
            query.dimensions() == self.dimensions(),
            "query has {} dimensions, index has {}",
            query.dimensions(),
            self.dimensions()
        );

        let scores = self.vectors.dot(&ArrayView1::from(query.as_slice()));
        let mut ranked: Vec<Neighbor> = scores
            .iter()
            .enumerate()
            .map(|(ordinal, &score)| Neighbor { score, ordinal })
            .collect();

        // Descending score, ties by ascending ordinal so results are deterministic
        let order = |a: &Neighbor, b: &Neighbor| {
            b.score.total_cmp(&a.score).then(a.ordinal.cmp(&b.ordinal))
        };
        if top_k < ranked.len() {
            ranked.select_nth_unstable_by(top_k - 1, order);
            ranked.truncate(top_k);
        }
        ranked.sort_by(order);

        Ok(ranked)
    }
}
