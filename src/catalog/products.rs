//! Write path for the `products` table.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub sku: String,
    pub title: Option<String>,
    pub image_path: String,
}

/// SKU inferred from an image file: its stem (`rings/R-104.jpg` → `R-104`).
pub fn infer_sku(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Insert a product, or repoint an existing SKU at a new image.
pub fn upsert_product(conn: &Connection, product: &Product) -> Result<()> {
    conn.execute(
        "INSERT INTO products (sku, title, image_path) VALUES (?1, ?2, ?3) \
         ON CONFLICT(sku) DO UPDATE SET image_path = excluded.image_path",
        params![product.sku, product.title, product.image_path],
    )?;
    Ok(())
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub upserted: usize,
    pub skipped: Vec<PathBuf>,
}

/// Upsert one product per image with `sku = title = file stem`, in one transaction.
pub fn import_images(conn: &mut Connection, images: &[PathBuf]) -> Result<ImportSummary> {
    let tx = conn.transaction()?;
    let mut summary = ImportSummary::default();

    for path in images {
        let Some(sku) = infer_sku(path) else {
            summary.skipped.push(path.clone());
            continue;
        };
        let product = Product {
            title: Some(sku.clone()),
            sku,
            image_path: path.to_string_lossy().into_owned(),
        };
        tracing::debug!(sku = %product.sku, path = %product.image_path, "upserting product");
        upsert_product(&tx, &product)?;
        summary.upserted += 1;
    }

    tx.commit()?;
    Ok(summary)
}

/// All products in row-id order.
pub fn list_products(conn: &Connection) -> Result<Vec<Product>> {
    let mut stmt = conn.prepare(
        "SELECT sku, title, image_path FROM products \
         WHERE sku IS NOT NULL AND image_path IS NOT NULL ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Product {
                sku: row.get(0)?,
                title: row.get(1)?,
                image_path: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_products(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
    Ok(count as u64)
}
