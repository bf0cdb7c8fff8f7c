//! Image + text fusion re-ranking.
//!
//! Both modalities retrieve a large unfiltered candidate pool. Only items found
//! by *both* pools survive; their two cosine scores are summed and the sum is
//! re-ranked. An item strong in one modality alone never appears.

use anyhow::Result;
use std::collections::{HashMap, HashSet};

use super::percent::percent_from_fused;
use super::types::{Corpus, Hit, RawHit};
use crate::embedding::EmbeddingVector;

/// Intersect two candidate pools and rank by summed score.
///
/// The working set is seeded from `image_pool` in its order, so equal sums keep
/// image-rank order. A repeated identifier within one pool counts once, at its
/// first (best) position.
pub fn fuse(image_pool: &[RawHit], text_pool: &[RawHit], top_k: usize) -> Vec<RawHit> {
    struct Entry<'a> {
        identifier: &'a str,
        score: f32,
        in_text: bool,
    }

    let mut entries: Vec<Entry<'_>> = Vec::with_capacity(image_pool.len());
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(image_pool.len());
    for hit in image_pool {
        if slots.contains_key(hit.identifier.as_str()) {
            continue;
        }
        slots.insert(&hit.identifier, entries.len());
        entries.push(Entry {
            identifier: &hit.identifier,
            score: hit.score,
            in_text: false,
        });
    }

    let mut seen_text: HashSet<&str> = HashSet::with_capacity(text_pool.len());
    for hit in text_pool {
        if !seen_text.insert(&hit.identifier) {
            continue;
        }
        if let Some(&slot) = slots.get(hit.identifier.as_str()) {
            entries[slot].score += hit.score;
            entries[slot].in_text = true;
        }
    }

    let mut fused: Vec<RawHit> = entries
        .into_iter()
        .filter(|e| e.in_text)
        .map(|e| RawHit {
            identifier: e.identifier.to_string(),
            score: e.score,
        })
        .collect();

    // sort_by is stable: ties keep insertion order
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(top_k);
    fused
}

/// Hybrid search over already-embedded queries.
///
/// `candidate_pool` is the per-modality retrieval depth; it is raised to
/// `top_k` when smaller so a large `top_k` is never starved by the pool.
pub fn search_hybrid(
    corpus: &Corpus,
    image_query: &EmbeddingVector,
    text_query: &EmbeddingVector,
    top_k: usize,
    candidate_pool: usize,
) -> Result<Vec<Hit>> {
    let pool = candidate_pool.max(top_k);
    let image_pool = corpus.raw_search(image_query, pool)?;
    let text_pool = corpus.raw_search(text_query, pool)?;

    let fused = fuse(&image_pool, &text_pool, top_k);
    tracing::debug!(
        pool,
        image_candidates = image_pool.len(),
        text_candidates = text_pool.len(),
        returned = fused.len(),
        "hybrid fusion"
    );

    Ok(fused
        .into_iter()
        .enumerate()
        .map(|(i, raw)| corpus.enrich(i + 1, percent_from_fused(raw.score), raw))
        .collect())
}
