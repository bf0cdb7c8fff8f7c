//! CLI `catalog` commands: initialize the database and import products.

use anyhow::Result;
use std::path::PathBuf;

use lustre::catalog::{products, scan};
use lustre::config::LustreConfig;
use lustre::db;

/// Create the database and schema if they do not exist yet.
pub fn init(config: &LustreConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    let count = products::count_products(&conn)?;
    println!("Database ready at {} ({count} products)", db_path.display());
    Ok(())
}

/// Upsert one product per image found under `dir`.
pub fn import(config: &LustreConfig, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| config.resolved_images_dir());
    let images = scan::scan_images(&dir)?;

    let mut conn = db::open_database(config.resolved_db_path())?;
    let summary = products::import_images(&mut conn, &images)?;
    tracing::info!(upserted = summary.upserted, dir = %dir.display(), "catalog import finished");

    println!("Imported {} products from {}", summary.upserted, dir.display());
    for path in &summary.skipped {
        println!("  skipped (no file stem): {}", path.display());
    }
    println!("Total products: {}", products::count_products(&conn)?);
    Ok(())
}
