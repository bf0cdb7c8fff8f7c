//! CLI `doctor` command: check the database, index files, and models.

use anyhow::{Context, Result};

use lustre::config::LustreConfig;
use lustre::db;
use lustre::embedding::clip;
use lustre::index::storage::IndexStorage;
use lustre::index::NearestNeighbors;

/// Run diagnostics and print a health report.
pub fn doctor(config: &LustreConfig) -> Result<()> {
    println!("Lustre Health Report");
    println!("====================");
    println!();

    let db_path = config.resolved_db_path();
    if db_path.exists() {
        let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
        let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;

        println!("Database:          {}", db_path.display());
        println!("File size:         {}", format_bytes(file_size));
        println!("Schema version:    {}", report.schema_version);
        println!("Products:          {}", report.product_count);
        println!();
        println!("Embedding model:");
        println!("  Indexed with:    {}", report.embedding_model.as_deref().unwrap_or("(not set)"));
        println!("  Configured:      {}", config.embedding.model);
        if let Some(ref stored) = report.embedding_model {
            if stored != &config.embedding.model {
                println!("  WARNING: model mismatch! Run `lustre index build` to re-embed the catalog.");
            } else {
                println!("  Status:          OK (match)");
            }
        }
        println!();
        if report.integrity_ok {
            println!("Integrity check:   PASSED");
        } else {
            println!("Integrity check:   FAILED ({})", report.integrity_details);
            println!("  Recreate it with `lustre catalog init` and `lustre catalog import`.");
        }
    } else {
        println!("Database:          not found at {}", db_path.display());
        println!("  Run `lustre catalog init` then `lustre catalog import`.");
    }
    println!();

    let storage = IndexStorage::new(config.resolved_index_path(), config.resolved_id_map_path());
    if storage.exists() {
        match storage.load() {
            Ok((index, id_map)) => {
                let size = std::fs::metadata(storage.index_path()).map(|m| m.len()).unwrap_or(0);
                println!("Index:             {}", storage.index_path().display());
                println!("File size:         {}", format_bytes(size));
                println!("Vectors:           {} x {}", index.len(), index.dimensions());
                println!("Id map rows:       {} (checksum OK)", id_map.len());
            }
            Err(e) => {
                println!("Index:             FAILED to load: {e}");
                println!("  Rebuild it with `lustre index build`.");
            }
        }
    } else {
        println!("Index:             not found at {}", storage.index_path().display());
        println!("  Run `lustre index build`.");
    }
    println!();

    println!("Models ({}):", config.resolved_model_dir().display());
    let mut model_files = clip::model_files(&config.resolved_model_dir()).to_vec();
    if config.background.enabled {
        model_files.push(config.resolved_model_dir().join(&config.background.model_file));
    }
    for path in model_files {
        let status = match std::fs::metadata(&path) {
            Ok(m) => format_bytes(m.len()),
            Err(_) => "MISSING (run `lustre model download`)".to_string(),
        };
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        println!("  {name:<18} {status}");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
