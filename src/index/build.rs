//! Offline index build: embed every catalog image and assign ordinals.

use anyhow::Result;
use std::path::PathBuf;

use super::id_map::IdMap;
use super::FlatIndex;
use crate::embedding::{Embedder, EmbeddingVector};

/// An image that could not be embedded and was left out of the index.
#[derive(Debug)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: String,
}

pub struct BuildOutput {
    pub index: FlatIndex,
    pub id_map: IdMap,
    pub skipped: Vec<SkippedImage>,
}

/// Embed `images` in order. Ordinals follow the order of the images that
/// embedded successfully; failures are skipped and reported, never fatal.
///
/// `on_progress` is called once per input image.
pub fn build_index(
    embedder: &dyn Embedder,
    images: &[PathBuf],
    mut on_progress: impl FnMut(usize),
) -> Result<BuildOutput> {
    let mut vectors: Vec<EmbeddingVector> = Vec::with_capacity(images.len());
    let mut identifiers = Vec::with_capacity(images.len());
    let mut skipped = Vec::new();

    for (i, path) in images.iter().enumerate() {
        let embedded = image::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|img| embedder.embed_image(&img));

        match embedded {
            Ok(vector) => {
                vectors.push(vector);
                identifiers.push(path.to_string_lossy().into_owned());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping image");
                skipped.push(SkippedImage {
                    path: path.clone(),
                    reason: format!("{e:#}"),
                });
            }
        }
        on_progress(i + 1);
    }

    anyhow::ensure!(!vectors.is_empty(), "no embeddable images found");

    let index = FlatIndex::build(&vectors)?;
    Ok(BuildOutput {
        index,
        id_map: IdMap::new(identifiers),
        skipped,
    })
}
