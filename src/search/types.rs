use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;

use super::percent::round_percent;
use crate::catalog::metadata::{normalize_identifier, MetadataStore};
use crate::embedding::EmbeddingVector;
use crate::index::id_map::IdMap;
use crate::index::NearestNeighbors;

// ── Public types ──────────────────────────────────────────────────────────────

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// 1-based, dense.
    pub rank: usize,
    pub match_percent: f64,
    pub raw_score: f32,
    pub image_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An index neighbor resolved to its source identifier, before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub identifier: String,
    pub score: f32,
}

/// Everything a query reads: the vector index, the ordinal → identifier map
/// kept in lockstep with it, and the metadata snapshot.
#[derive(Clone)]
pub struct Corpus {
    index: Arc<dyn NearestNeighbors>,
    id_map: Arc<IdMap>,
    metadata: Arc<MetadataStore>,
}

// ── Corpus ────────────────────────────────────────────────────────────────────

impl Corpus {
    pub fn new(
        index: Arc<dyn NearestNeighbors>,
        id_map: Arc<IdMap>,
        metadata: Arc<MetadataStore>,
    ) -> Result<Self> {
        anyhow::ensure!(
            index.len() == id_map.len(),
            "index holds {} vectors but id map has {} rows",
            index.len(),
            id_map.len()
        );
        Ok(Self {
            index,
            id_map,
            metadata,
        })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    /// Top-`top_k` neighbors with identifiers attached, best first, unfiltered.
    pub fn raw_search(&self, query: &EmbeddingVector, top_k: usize) -> Result<Vec<RawHit>> {
        let neighbors = self.index.search(query, top_k)?;
        neighbors
            .into_iter()
            .map(|n| {
                let identifier = self
                    .id_map
                    .get(n.ordinal)
                    .with_context(|| format!("ordinal {} has no id map row", n.ordinal))?;
                Ok(RawHit {
                    identifier: identifier.to_string(),
                    score: n.score,
                })
            })
            .collect()
    }

    /// Attach rank, rounded percent, and whatever metadata the identifier resolves to.
    pub(crate) fn enrich(&self, rank: usize, percent: f64, raw: RawHit) -> Hit {
        let product = self.metadata.lookup(&raw.identifier);
        Hit {
            rank,
            match_percent: round_percent(percent),
            raw_score: raw.score,
            image_path: normalize_identifier(&raw.identifier),
            sku: product.map(|p| p.sku.clone()),
            title: product.and_then(|p| p.title.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProductInfo;
    use crate::index::FlatIndex;

    fn unit(values: &[f32]) -> EmbeddingVector {
        EmbeddingVector::normalize(values.to_vec()).unwrap()
    }

    fn corpus() -> Corpus {
        let index = FlatIndex::build(&[unit(&[1.0, 0.0]), unit(&[0.0, 1.0])]).unwrap();
        let id_map = IdMap::new(vec![r"imgs\R1.jpg".into(), "imgs/N2.jpg".into()]);
        let metadata = MetadataStore::from_rows(vec![(
            "imgs/R1.jpg".to_string(),
            ProductInfo {
                sku: "R1".into(),
                title: None,
            },
        )]);
        Corpus::new(Arc::new(index), Arc::new(id_map), Arc::new(metadata)).unwrap()
    }

    #[test]
    fn mismatched_id_map_is_rejected() {
        let index = FlatIndex::build(&[unit(&[1.0, 0.0])]).unwrap();
        let id_map = IdMap::new(vec!["a.jpg".into(), "b.jpg".into()]);
        assert!(Corpus::new(
            Arc::new(index),
            Arc::new(id_map),
            Arc::new(MetadataStore::default())
        )
        .is_err());
    }

    #[test]
    fn raw_search_resolves_identifiers() {
        let hits = corpus().raw_search(&unit(&[0.0, 1.0]), 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identifier, "imgs/N2.jpg");
    }

    #[test]
    fn enrich_normalizes_path_and_skips_missing_metadata() {
        let c = corpus();
        let hits = c.raw_search(&unit(&[1.0, 0.0]), 2).unwrap();

        let first = c.enrich(1, 99.999, hits[0].clone());
        assert_eq!(first.image_path, "imgs/R1.jpg");
        assert_eq!(first.sku.as_deref(), Some("R1"));
        assert_eq!(first.match_percent, 100.0);

        let second = c.enrich(2, 50.0, hits[1].clone());
        assert!(second.sku.is_none());
        let json = serde_json::to_string(&second).unwrap();
        assert!(!json.contains("sku"));
        assert!(!json.contains("title"));
    }
}
