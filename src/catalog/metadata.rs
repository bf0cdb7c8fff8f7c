//! Read-only product metadata keyed by image path.
//!
//! The index records image paths as they were written at build time, which may
//! not match the separator convention used when products were imported. Lookups
//! therefore try three keys in turn: the exact path, the path with `\` turned
//! into `/`, and finally the bare file name.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Which step of the fallback chain resolved a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Exact,
    Normalized,
    Filename,
}

/// Forward slashes everywhere.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.replace('\\', "/")
}

fn file_name(normalized: &str) -> &str {
    normalized.rsplit('/').next().unwrap_or(normalized)
}

/// In-memory snapshot of the `products` table.
///
/// Loaded once at startup and never mutated, so it can be shared across request
/// handlers behind an `Arc` without locking.
#[derive(Debug, Default)]
pub struct MetadataStore {
    // Row-id order; indexes below point into this
    products: Vec<ProductInfo>,
    exact: HashMap<String, usize>,
    normalized: HashMap<String, usize>,
    // Normalized paths in row-id order, for the file-name fallback
    paths: Vec<(String, usize)>,
}

impl MetadataStore {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare(
            "SELECT image_path, sku, title FROM products \
             WHERE image_path IS NOT NULL AND sku IS NOT NULL ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ProductInfo {
                        sku: row.get(1)?,
                        title: row.get(2)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let store = Self::from_rows(rows);
        tracing::info!(products = store.len(), "metadata snapshot loaded");
        Ok(store)
    }

    /// Build from `(image_path, product)` pairs. Earlier rows win when two
    /// rows normalize to the same key.
    pub fn from_rows(rows: impl IntoIterator<Item = (String, ProductInfo)>) -> Self {
        let mut store = Self::default();
        for (image_path, product) in rows {
            let slot = store.products.len();
            store.products.push(product);

            let normalized = normalize_identifier(&image_path);
            store.exact.entry(image_path).or_insert(slot);
            store.normalized.entry(normalized.clone()).or_insert(slot);
            store.paths.push((normalized, slot));
        }
        store
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn lookup(&self, identifier: &str) -> Option<&ProductInfo> {
        self.lookup_with_kind(identifier).map(|(info, _)| info)
    }

    pub fn lookup_with_kind(&self, identifier: &str) -> Option<(&ProductInfo, MatchKind)> {
        if let Some(&slot) = self.exact.get(identifier) {
            return Some((&self.products[slot], MatchKind::Exact));
        }

        let normalized = normalize_identifier(identifier);
        if let Some(&slot) = self.normalized.get(&normalized) {
            return Some((&self.products[slot], MatchKind::Normalized));
        }

        let name = file_name(&normalized);
        if name.is_empty() {
            return None;
        }
        self.paths
            .iter()
            .find(|(path, _)| {
                path == name
                    || path
                        .strip_suffix(name)
                        .is_some_and(|prefix| prefix.ends_with('/'))
            })
            .map(|&(_, slot)| (&self.products[slot], MatchKind::Filename))
    }
}
