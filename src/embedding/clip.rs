//! Local ONNX Runtime CLIP embedder.
//!
//! Implements [`Embedder`] with the ViT-B/32 vision and text towers exported to
//! ONNX. Handles tokenization, pixel preprocessing, inference, and L2 normalization.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{preprocess, Embedder, EmbeddingVector, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// CLIP's text context window.
const MAX_SEQ_LEN: usize = 77;

pub const VISUAL_MODEL_FILE: &str = "visual.onnx";
pub const TEXTUAL_MODEL_FILE: &str = "textual.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// CLIP embedder backed by two ONNX sessions that share one projection space.
pub struct ClipEmbedder {
    visual: Mutex<Session>,
    textual: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Sessions are behind Mutexes, which
// guarantee exclusive access during run().
unsafe impl Send for ClipEmbedder {}
unsafe impl Sync for ClipEmbedder {}

/// Paths of the three files the embedder needs inside the model cache dir.
pub fn model_files(cache_dir: &Path) -> [PathBuf; 3] {
    [
        cache_dir.join(VISUAL_MODEL_FILE),
        cache_dir.join(TEXTUAL_MODEL_FILE),
        cache_dir.join(TOKENIZER_FILE),
    ]
}

impl ClipEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let [visual_path, textual_path, tokenizer_path] = model_files(&cache_dir);

        for path in [&visual_path, &textual_path, &tokenizer_path] {
            anyhow::ensure!(
                path.exists(),
                "{} not found. Run `lustre model download` first.",
                path.display()
            );
        }

        let visual = load_session(&visual_path, config.intra_threads)?;
        let textual = load_session(&textual_path, config.intra_threads)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tracing::info!(
            model = %config.model,
            tokenizer = %tokenizer_path.display(),
            "CLIP embedder loaded"
        );

        Ok(Self {
            visual: Mutex::new(visual),
            textual: Mutex::new(textual),
            tokenizer,
        })
    }
}

pub(crate) fn load_session(path: &Path, intra_threads: usize) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads.max(1))?
        .commit_from_file(path)
        .with_context(|| format!("failed to load ONNX model {}", path.display()))?;
    tracing::info!(model = %path.display(), "ONNX model loaded");
    Ok(session)
}

/// First row of a pooled `[batch, dim]` projection.
fn first_row(dims: &[i64], data: &[f32]) -> Result<Vec<f32>> {
    anyhow::ensure!(
        dims.len() == 2 && dims[1] == EMBEDDING_DIM as i64,
        "unexpected embedding shape: {dims:?}, expected [batch, {EMBEDDING_DIM}]"
    );
    anyhow::ensure!(dims[0] >= 1, "encoder returned an empty batch");
    Ok(data[..EMBEDDING_DIM].to_vec())
}

impl Embedder for ClipEmbedder {
    fn embed_image(&self, image: &DynamicImage) -> Result<EmbeddingVector> {
        let pixels = preprocess::clip_pixel_values(image);
        let shape: Vec<i64> = pixels.shape().iter().map(|&d| d as i64).collect();
        let flat: Vec<f32> = pixels.iter().copied().collect();
        let pixel_tensor = Tensor::from_array((shape, flat.into_boxed_slice()))?;

        let mut session = self
            .visual
            .lock()
            .map_err(|e| anyhow::anyhow!("vision session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "pixel_values" => pixel_tensor,
        })?;

        // Export tools disagree on output names; fall back to the first output.
        let value = outputs
            .get("image_embeds")
            .or_else(|| outputs.get("embeddings"))
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract image_embeds tensor")?;
        let raw = first_row(&shape, data)?;

        EmbeddingVector::normalize(raw)
    }

    fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();

        let shape = vec![1i64, input_ids.len() as i64];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape, attention_mask.into_boxed_slice()))?;

        let mut session = self
            .textual
            .lock()
            .map_err(|e| anyhow::anyhow!("text session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
        })?;

        let value = outputs
            .get("text_embeds")
            .or_else(|| outputs.get("embeddings"))
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .context("failed to extract text_embeds tensor")?;
        let raw = first_row(&shape, data)?;

        EmbeddingVector::normalize(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{l2_norm, NORM_TOLERANCE};
    use image::{Rgb, RgbImage};

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig::default()
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn missing_model_files_are_reported() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = EmbeddingConfig {
            cache_dir: tmp.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        let err = ClipEmbedder::new(&config).err().unwrap();
        assert!(err.to_string().contains("lustre model download"));
    }

    #[test]
    #[ignore] // Requires model files, run with: cargo test -- --ignored
    fn image_embedding_is_unit_norm() {
        let embedder = ClipEmbedder::new(&test_config()).unwrap();
        let v = embedder.embed_image(&gradient(300, 200)).unwrap();
        assert_eq!(v.dimensions(), EMBEDDING_DIM);
        assert!((l2_norm(v.as_slice()) - 1.0).abs() < NORM_TOLERANCE);
    }

    #[test]
    #[ignore]
    fn text_embedding_is_unit_norm() {
        let embedder = ClipEmbedder::new(&test_config()).unwrap();
        let v = embedder.embed_text("a gold ring with a red stone").unwrap();
        assert_eq!(v.dimensions(), EMBEDDING_DIM);
        assert!((l2_norm(v.as_slice()) - 1.0).abs() < NORM_TOLERANCE);
    }

    #[test]
    #[ignore]
    fn empty_text_does_not_crash() {
        let embedder = ClipEmbedder::new(&test_config()).unwrap();
        let v = embedder.embed_text("").unwrap();
        assert!((l2_norm(v.as_slice()) - 1.0).abs() < NORM_TOLERANCE);
    }

    #[test]
    #[ignore]
    fn embedding_is_deterministic() {
        let embedder = ClipEmbedder::new(&test_config()).unwrap();
        let a = embedder.embed_text("silver necklace").unwrap();
        let b = embedder.embed_text("silver necklace").unwrap();
        assert_eq!(a, b, "same input must produce identical output");
    }
}
