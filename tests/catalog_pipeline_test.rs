mod helpers;

use helpers::*;
use lustre::catalog::{products, scan, MetadataStore};
use lustre::context::{QuerySettings, SearchContext};
use lustre::index::build::build_index;
use lustre::index::storage::IndexStorage;
use lustre::search::Corpus;
use std::sync::Arc;
use tempfile::TempDir;

const RED: [u8; 3] = [200, 0, 0];
const GREEN: [u8; 3] = [0, 200, 0];
const BLUE: [u8; 3] = [0, 0, 200];

fn embedder() -> ScriptedEmbedder {
    ScriptedEmbedder::new(3)
        .color(RED, unit(&[1.0, 0.0, 0.0]))
        .color(GREEN, unit(&[0.0, 1.0, 0.0]))
        .color(BLUE, unit(&[0.0, 0.0, 1.0]))
        .text("something red", unit(&[0.9, 0.1, 0.0]))
}

fn write_catalog(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("rings")).unwrap();
    write_png(&root.join("rings/R-100.png"), RED);
    write_png(&root.join("rings/R-200.PNG"), GREEN);
    write_png(&root.join("N-300.png"), BLUE);
    std::fs::write(root.join("README.txt"), "not an image").unwrap();
}

#[test]
fn import_then_build_then_search_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let images_dir = tmp.path().join("images");
    write_catalog(&images_dir);

    // Import products from the same scan the index build uses
    let images = scan::scan_images(&images_dir).unwrap();
    assert_eq!(images.len(), 3);
    let mut conn = test_db();
    let summary = products::import_images(&mut conn, &images).unwrap();
    assert_eq!(summary.upserted, 3);

    // Build and publish the index
    let embedder = embedder();
    let output = build_index(&embedder, &images, |_| {}).unwrap();
    assert!(output.skipped.is_empty());
    let storage = IndexStorage::new(tmp.path().join("catalog.index"), tmp.path().join("id_map.csv"));
    storage.save(&output.index, &output.id_map).unwrap();

    // Reload as a server would
    let (index, id_map) = storage.load().unwrap();
    let metadata = MetadataStore::load(&conn).unwrap();
    let corpus = Corpus::new(Arc::new(index), Arc::new(id_map), Arc::new(metadata)).unwrap();
    let context = SearchContext::from_parts(Arc::new(embedder), corpus, QuerySettings::default());

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let hits = runtime
        .block_on(context.search_image(solid_image(GREEN), 3, 80.0))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].sku.as_deref(), Some("R-200"));
    assert!(hits[0].image_path.ends_with("rings/R-200.PNG"));

    let hits = runtime
        .block_on(context.search_hybrid(solid_image(RED), "something red".into(), 3))
        .unwrap();
    assert_eq!(hits[0].sku.as_deref(), Some("R-100"));
    assert_eq!(hits.len(), 3);
}

#[test]
fn reimport_repoints_moved_images() {
    let tmp = TempDir::new().unwrap();
    let old_dir = tmp.path().join("old");
    let new_dir = tmp.path().join("new");
    write_catalog(&old_dir);
    std::fs::create_dir_all(&new_dir).unwrap();
    write_png(&new_dir.join("N-300.png"), BLUE);

    let mut conn = test_db();
    products::import_images(&mut conn, &scan::scan_images(&old_dir).unwrap()).unwrap();
    products::import_images(&mut conn, &scan::scan_images(&new_dir).unwrap()).unwrap();

    assert_eq!(products::count_products(&conn).unwrap(), 3);
    let metadata = MetadataStore::load(&conn).unwrap();
    let moved = new_dir.join("N-300.png");
    assert_eq!(
        metadata.lookup(&moved.to_string_lossy()).map(|p| p.sku.as_str()),
        Some("N-300")
    );
}

#[test]
fn stats_report_index_and_coverage() {
    let tmp = TempDir::new().unwrap();
    let images_dir = tmp.path().join("images");
    write_catalog(&images_dir);
    let images = scan::scan_images(&images_dir).unwrap();

    let mut conn = test_db();
    products::import_images(&mut conn, &images[..2]).unwrap();

    let output = build_index(&embedder(), &images, |_| {}).unwrap();
    let storage = IndexStorage::new(tmp.path().join("c.index"), tmp.path().join("c.csv"));
    storage.save(&output.index, &output.id_map).unwrap();

    let stats = lustre::stats::catalog_stats(&conn, &storage, None).unwrap();
    assert_eq!(stats.products, 2);
    let index = stats.index.unwrap();
    assert_eq!(index.vectors, 3);
    assert_eq!(index.metadata.exact, 2);
    assert_eq!(index.metadata.missing, 1);
    assert_eq!(index.products_not_indexed, 0);
}
