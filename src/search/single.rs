use anyhow::Result;

use super::percent::{percent_from_cosine, round_percent};
use super::types::{Corpus, Hit};
use crate::embedding::EmbeddingVector;

/// Top-`top_k` neighbors of `query` whose percent clears `min_percent`.
///
/// A hit survives when both its unrounded percent and the rounded value it is
/// presented with clear `min_percent`, so no returned `match_percent` is below
/// the threshold. Ranks are assigned after filtering, so they stay dense. No
/// survivors is an empty result.
pub fn search_single(
    corpus: &Corpus,
    query: &EmbeddingVector,
    top_k: usize,
    min_percent: f64,
) -> Result<Vec<Hit>> {
    let candidates = corpus.raw_search(query, top_k)?;
    let considered = candidates.len();

    let hits: Vec<Hit> = candidates
        .into_iter()
        .map(|raw| (percent_from_cosine(raw.score), raw))
        .filter(|(percent, _)| *percent >= min_percent && round_percent(*percent) >= min_percent)
        .enumerate()
        .map(|(i, (percent, raw))| corpus.enrich(i + 1, percent, raw))
        .collect();

    tracing::debug!(
        top_k,
        min_percent,
        considered,
        returned = hits.len(),
        "single-modality search"
    );
    Ok(hits)
}
