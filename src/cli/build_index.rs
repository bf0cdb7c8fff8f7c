//! CLI `index build`: embed every catalog image and publish a new index.

use anyhow::{Context, Result};
use std::path::PathBuf;

use lustre::catalog::scan;
use lustre::config::LustreConfig;
use lustre::db;
use lustre::embedding;
use lustre::index::build;
use lustre::index::storage::IndexStorage;

pub fn build_index(config: &LustreConfig, images_dir: Option<PathBuf>) -> Result<()> {
    let images_dir = images_dir.unwrap_or_else(|| config.resolved_images_dir());
    let images = scan::scan_images(&images_dir)?;
    anyhow::ensure!(
        !images.is_empty(),
        "no images found under {}",
        images_dir.display()
    );
    println!("Found {} images under {}", images.len(), images_dir.display());

    let embedder = embedding::create_provider(&config.embedding)?;

    let pb = super::progress_bar(images.len() as u64, "embedding")?;
    let output = build::build_index(embedder.as_ref(), &images, |done| pb.set_position(done as u64))?;
    pb.finish_and_clear();

    let storage = IndexStorage::new(config.resolved_index_path(), config.resolved_id_map_path());
    storage
        .save(&output.index, &output.id_map)
        .context("failed to write index")?;

    // Record which model produced the vectors so servers can detect a mismatch
    let conn = db::open_database(config.resolved_db_path())?;
    db::migrations::set_embedding_model(&conn, &config.embedding.model)?;

    println!(
        "Indexed {} images into {}",
        output.id_map.len(),
        storage.index_path().display()
    );
    println!("Id map:  {}", storage.id_map_path().display());
    if !output.skipped.is_empty() {
        println!("Skipped {} unreadable images:", output.skipped.len());
        for skipped in &output.skipped {
            println!("  {}: {}", skipped.path.display(), skipped.reason);
        }
    }
    Ok(())
}
