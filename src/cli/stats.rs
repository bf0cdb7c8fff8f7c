use anyhow::Result;

use lustre::config::LustreConfig;
use lustre::index::storage::IndexStorage;

/// Display catalog and index statistics in the terminal.
pub fn stats(config: &LustreConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = lustre::db::open_database(&db_path)?;
    let storage = IndexStorage::new(config.resolved_index_path(), config.resolved_id_map_path());

    let response = lustre::stats::catalog_stats(&conn, &storage, Some(&db_path))?;

    println!("Catalog Statistics");
    println!("{}", "=".repeat(40));
    println!("  Products:            {}", response.products);
    println!("  Database size:       {} bytes", response.db_size_bytes);
    println!(
        "  Embedding model:     {}",
        response.embedding_model.as_deref().unwrap_or("(not set)")
    );
    println!();

    let Some(index) = response.index else {
        println!("Index: not built. Run `lustre index build`.");
        return Ok(());
    };

    println!("Index:");
    println!("  Vectors:             {}", index.vectors);
    println!("  Dimensions:          {}", index.dimensions);
    println!("  File size:           {} bytes", index.size_bytes);
    if let Some(built_at) = index.built_at {
        println!(
            "  Built:               {}",
            built_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();

    println!("Metadata coverage:");
    println!("  {:<12} {}", "exact", index.metadata.exact);
    println!("  {:<12} {}", "normalized", index.metadata.normalized);
    println!("  {:<12} {}", "filename", index.metadata.filename);
    println!("  {:<12} {}", "missing", index.metadata.missing);
    println!();
    println!("Products not indexed:  {}", index.products_not_indexed);

    Ok(())
}
