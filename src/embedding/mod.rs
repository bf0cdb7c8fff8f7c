//! Image and text embedding into a shared similarity space.
//!
//! Provides the [`Embedder`] trait, the unit-norm [`EmbeddingVector`] it produces, and
//! a local CLIP implementation running on ONNX Runtime. Providers are created from
//! configuration via [`create_provider`].

pub mod clip;
pub mod preprocess;

use anyhow::Result;
use image::DynamicImage;

/// Output dimensions of the CLIP ViT-B/32 projection head.
pub const EMBEDDING_DIM: usize = 512;

/// Norm tolerance for vectors that claim to be unit length.
pub const NORM_TOLERANCE: f32 = 1e-4;

/// An L2-normalized embedding. The only way to build one is through
/// [`EmbeddingVector::normalize`], so every value has unit norm.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Normalize raw model output to unit length.
    ///
    /// Fails on empty, zero-norm, or non-finite input: there is no meaningful
    /// direction to return for those.
    pub fn normalize(raw: Vec<f32>) -> Result<Self> {
        anyhow::ensure!(!raw.is_empty(), "embedding has zero dimensions");
        anyhow::ensure!(
            raw.iter().all(|x| x.is_finite()),
            "embedding contains non-finite values"
        );
        let norm = l2_norm(&raw);
        anyhow::ensure!(norm > f32::EPSILON, "embedding has zero norm");
        Ok(Self(raw.into_iter().map(|x| x / norm).collect()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Maps images and text into one shared vector space.
///
/// All methods are synchronous and may be CPU/GPU heavy; callers in async
/// contexts should use `tokio::task::spawn_blocking`.
pub trait Embedder: Send + Sync {
    fn embed_image(&self, image: &DynamicImage) -> Result<EmbeddingVector>;

    fn embed_text(&self, text: &str) -> Result<EmbeddingVector>;

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Create an embedder from config.
///
/// Currently only `"clip"` is supported (ONNX Runtime + CLIP ViT-B/32).
/// Returns an error if model files are missing; run `lustre model download` first.
pub fn create_provider(config: &crate::config::EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "clip" => {
            let provider = clip::ClipEmbedder::new(config)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: clip"),
    }
}
