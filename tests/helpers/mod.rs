#![allow(dead_code)]

use anyhow::Result;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use lustre::catalog::{MetadataStore, ProductInfo};
use lustre::db;
use lustre::embedding::{Embedder, EmbeddingVector};
use lustre::index::id_map::IdMap;
use lustre::index::{Neighbor, NearestNeighbors};
use lustre::search::Corpus;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// Unit vector from raw components.
pub fn unit(values: &[f32]) -> EmbeddingVector {
    EmbeddingVector::normalize(values.to_vec()).unwrap()
}

/// One-hot unit vector of `dims` dimensions with the spike at `axis`.
pub fn axis(dims: usize, axis: usize) -> EmbeddingVector {
    let mut v = vec![0.0f32; dims];
    v[axis] = 1.0;
    EmbeddingVector::normalize(v).unwrap()
}

/// Deterministic pseudo-random unit vectors (xorshift), for property-style tests.
pub fn pseudo_random_vectors(count: usize, dims: usize, seed: u64) -> Vec<EmbeddingVector> {
    let mut state = seed.max(1);
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % 2000) as f32 / 1000.0 - 1.0
    };
    (0..count)
        .map(|_| {
            let raw: Vec<f32> = (0..dims).map(|_| next() + 1e-3).collect();
            EmbeddingVector::normalize(raw).unwrap()
        })
        .collect()
}

/// Index returning canned neighbors per query, standing in for a real index
/// when a test needs exact scores. Queries are matched on their first
/// dimension that is non-zero.
pub struct CannedIndex {
    len: usize,
    dims: usize,
    answers: HashMap<usize, Vec<Neighbor>>,
}

impl CannedIndex {
    pub fn new(len: usize, dims: usize) -> Self {
        Self {
            len,
            dims,
            answers: HashMap::new(),
        }
    }

    /// Answer queries along `query_axis` with `(ordinal, score)` pairs.
    pub fn answer(mut self, query_axis: usize, hits: &[(usize, f32)]) -> Self {
        let mut neighbors: Vec<Neighbor> = hits
            .iter()
            .map(|&(ordinal, score)| Neighbor { score, ordinal })
            .collect();
        neighbors.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.answers.insert(query_axis, neighbors);
        self
    }
}

impl NearestNeighbors for CannedIndex {
    fn len(&self) -> usize {
        self.len
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn search(&self, query: &EmbeddingVector, top_k: usize) -> Result<Vec<Neighbor>> {
        anyhow::ensure!(top_k >= 1, "top_k must be at least 1");
        let axis = query
            .as_slice()
            .iter()
            .position(|&x| x != 0.0)
            .unwrap_or(0);
        let mut hits = self.answers.get(&axis).cloned().unwrap_or_default();
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Embedder with scripted outputs: text by exact string, images by solid colour.
/// Unknown inputs fail, which lets tests exercise embedding errors.
#[derive(Default)]
pub struct ScriptedEmbedder {
    dims: usize,
    texts: HashMap<String, EmbeddingVector>,
    colors: HashMap<[u8; 3], EmbeddingVector>,
}

impl ScriptedEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            ..Default::default()
        }
    }

    pub fn text(mut self, text: &str, vector: EmbeddingVector) -> Self {
        self.texts.insert(text.to_string(), vector);
        self
    }

    pub fn color(mut self, color: [u8; 3], vector: EmbeddingVector) -> Self {
        self.colors.insert(color, vector);
        self
    }
}

impl Embedder for ScriptedEmbedder {
    fn embed_image(&self, image: &DynamicImage) -> Result<EmbeddingVector> {
        anyhow::ensure!(image.dimensions().0 > 0, "empty image");
        let color = image.to_rgb8().get_pixel(0, 0).0;
        self.colors
            .get(&color)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted vector for colour {color:?}"))
    }

    fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        self.texts
            .get(text)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted vector for {text:?}"))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

pub fn solid_image(color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb(color)))
}

pub fn write_png(path: &std::path::Path, color: [u8; 3]) {
    solid_image(color).save(path).unwrap();
}

/// Product rows keyed by image path, with `sku = title = name`.
pub fn metadata(rows: &[(&str, &str)]) -> MetadataStore {
    MetadataStore::from_rows(rows.iter().map(|&(path, sku)| {
        (
            path.to_string(),
            ProductInfo {
                sku: sku.to_string(),
                title: Some(sku.to_string()),
            },
        )
    }))
}

pub fn corpus(
    index: impl NearestNeighbors + 'static,
    identifiers: &[&str],
    metadata: MetadataStore,
) -> Corpus {
    let id_map = IdMap::new(identifiers.iter().map(|s| s.to_string()).collect());
    Corpus::new(Arc::new(index), Arc::new(id_map), Arc::new(metadata)).unwrap()
}
