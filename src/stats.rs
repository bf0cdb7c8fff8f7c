//! Catalog and index statistics.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::catalog::metadata::normalize_identifier;
use crate::catalog::{products, MatchKind, MetadataStore};
use crate::db::migrations;
use crate::index::storage::IndexStorage;
use crate::index::NearestNeighbors;

#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub products: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexStats>,
}

#[derive(Debug, Serialize)]
pub struct IndexStats {
    pub vectors: usize,
    pub dimensions: usize,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<DateTime<Utc>>,
    pub metadata: MetadataCoverage,
    /// Products whose image path appears nowhere in the index.
    pub products_not_indexed: u64,
}

/// How index entries resolve against the metadata snapshot.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct MetadataCoverage {
    pub exact: u64,
    pub normalized: u64,
    pub filename: u64,
    pub missing: u64,
}

/// Compute statistics. The index is loaded (and checksum-verified) if present;
/// a missing index is reported as `index: None`, not an error.
pub fn catalog_stats(
    conn: &Connection,
    storage: &IndexStorage,
    db_path: Option<&Path>,
) -> Result<CatalogStats> {
    let product_count = products::count_products(conn)?;
    let embedding_model = migrations::get_embedding_model(conn)?;
    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    let index = if storage.exists() {
        Some(index_stats(conn, storage)?)
    } else {
        None
    };

    Ok(CatalogStats {
        products: product_count,
        db_size_bytes,
        embedding_model,
        index,
    })
}

fn index_stats(conn: &Connection, storage: &IndexStorage) -> Result<IndexStats> {
    let (index, id_map) = storage.load()?;
    let metadata = MetadataStore::load(conn)?;

    let mut coverage = MetadataCoverage::default();
    for identifier in id_map.iter() {
        match metadata.lookup_with_kind(identifier).map(|(_, kind)| kind) {
            Some(MatchKind::Exact) => coverage.exact += 1,
            Some(MatchKind::Normalized) => coverage.normalized += 1,
            Some(MatchKind::Filename) => coverage.filename += 1,
            None => coverage.missing += 1,
        }
    }

    let indexed: HashSet<String> = id_map.iter().map(normalize_identifier).collect();
    let products_not_indexed = products::list_products(conn)?
        .iter()
        .filter(|p| !indexed.contains(&normalize_identifier(&p.image_path)))
        .count() as u64;

    let file = std::fs::metadata(storage.index_path())?;
    let built_at = file.modified().ok().map(DateTime::<Utc>::from);

    Ok(IndexStats {
        vectors: index.len(),
        dimensions: index.dimensions(),
        size_bytes: file.len(),
        built_at,
        metadata: coverage,
        products_not_indexed,
    })
}
