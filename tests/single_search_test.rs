mod helpers;

use helpers::*;
use lustre::context::{QuerySettings, SearchContext};
use lustre::index::FlatIndex;
use lustre::search::{percent_from_cosine, search_single, Corpus};
use std::collections::HashSet;
use std::sync::Arc;

const DIMS: usize = 16;

fn random_corpus(count: usize) -> (Corpus, Vec<String>) {
    let vectors = pseudo_random_vectors(count, DIMS, 42);
    let index = FlatIndex::build(&vectors).unwrap();
    let names: Vec<String> = (0..count).map(|i| format!("catalog/item_{i:03}.jpg")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    (corpus(index, &refs, metadata(&[])), names)
}

#[test]
fn percent_conversion_endpoints() {
    assert_eq!(percent_from_cosine(-1.0), 0.0);
    assert_eq!(percent_from_cosine(0.0), 50.0);
    assert_eq!(percent_from_cosine(1.0), 100.0);
}

#[test]
fn hits_are_sorted_dense_and_above_threshold() {
    let (corpus, _) = random_corpus(200);
    let queries = pseudo_random_vectors(10, DIMS, 7);

    for (q, query) in queries.iter().enumerate() {
        for &min_percent in &[0.0, 40.0, 55.0, 70.0] {
            let hits = search_single(&corpus, query, 25, min_percent).unwrap();
            assert!(hits.len() <= 25);

            for (i, hit) in hits.iter().enumerate() {
                assert_eq!(hit.rank, i + 1, "query {q}: ranks must be dense");
                assert!(
                    hit.match_percent >= min_percent,
                    "query {q}: {} below {min_percent}",
                    hit.match_percent
                );
                assert!(percent_from_cosine(hit.raw_score) >= min_percent);
            }
            for pair in hits.windows(2) {
                assert!(pair[0].match_percent >= pair[1].match_percent);
                assert!(pair[0].raw_score >= pair[1].raw_score);
            }
        }
    }
}

#[test]
fn hit_that_would_present_below_threshold_is_dropped() {
    // 0.600082 is 80.0041%, which presents as 80.0
    let index = CannedIndex::new(2, 4).answer(0, &[(0, 0.7), (1, 0.600_082)]);
    let corpus = corpus(index, &["a.jpg", "b.jpg"], metadata(&[]));

    let hits = search_single(&corpus, &axis(4, 0), 2, 80.004).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].image_path, "a.jpg");
    assert_eq!(hits[0].match_percent, 85.0);

    let hits = search_single(&corpus, &axis(4, 0), 2, 80.0).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[1].match_percent, 80.0);
}

#[test]
fn threshold_of_zero_keeps_the_full_top_k() {
    let (corpus, _) = random_corpus(50);
    let query = &pseudo_random_vectors(1, DIMS, 3)[0];
    let hits = search_single(&corpus, query, 10, 0.0).unwrap();
    assert_eq!(hits.len(), 10);
}

#[test]
fn top_k_beyond_index_returns_everything_once() {
    let (corpus, names) = random_corpus(12);
    let query = &pseudo_random_vectors(1, DIMS, 9)[0];
    let hits = search_single(&corpus, query, 1000, 0.0).unwrap();

    assert_eq!(hits.len(), names.len());
    let seen: HashSet<&str> = hits.iter().map(|h| h.image_path.as_str()).collect();
    assert_eq!(seen.len(), names.len());
    assert!(hits.iter().all(|h| !h.image_path.is_empty()));
}

#[test]
fn nothing_above_threshold_is_empty_not_an_error() {
    let index = FlatIndex::build(&[unit(&[1.0, 0.0]), unit(&[0.0, 1.0])]).unwrap();
    let corpus = corpus(index, &["a.jpg", "b.jpg"], metadata(&[]));
    let hits = search_single(&corpus, &unit(&[-1.0, -1.0]), 2, 50.0).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn repeated_query_is_byte_identical() {
    let (corpus, _) = random_corpus(100);
    let query = &pseudo_random_vectors(1, DIMS, 11)[0];

    let first = serde_json::to_vec(&search_single(&corpus, query, 20, 30.0).unwrap()).unwrap();
    let second = serde_json::to_vec(&search_single(&corpus, query, 20, 30.0).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn metadata_miss_leaves_fields_absent() {
    let index = FlatIndex::build(&[unit(&[1.0, 0.0]), unit(&[0.0, 1.0])]).unwrap();
    let corpus = corpus(
        index,
        &["imgs/known.jpg", "imgs/unknown.jpg"],
        metadata(&[("imgs/known.jpg", "K-1")]),
    );
    let hits = search_single(&corpus, &unit(&[1.0, 1.0]), 2, 0.0).unwrap();
    assert_eq!(hits.len(), 2);

    let known = hits.iter().find(|h| h.image_path == "imgs/known.jpg").unwrap();
    let unknown = hits.iter().find(|h| h.image_path == "imgs/unknown.jpg").unwrap();
    assert_eq!(known.sku.as_deref(), Some("K-1"));
    assert!(unknown.sku.is_none() && unknown.title.is_none());
}

#[tokio::test]
async fn context_text_and_image_search() {
    let index = FlatIndex::build(&[unit(&[1.0, 0.0]), unit(&[0.0, 1.0])]).unwrap();
    let corpus = corpus(index, &["red.jpg", "blue.jpg"], metadata(&[]));
    let embedder = ScriptedEmbedder::new(2)
        .color([255, 0, 0], unit(&[1.0, 0.0]))
        .text("blue", unit(&[0.0, 1.0]));
    let context = SearchContext::from_parts(Arc::new(embedder), corpus, QuerySettings::default());

    let hits = context
        .search_image(solid_image([255, 0, 0]), 8, 80.0)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].image_path, "red.jpg");
    assert_eq!(hits[0].match_percent, 100.0);

    let hits = context.search_text("blue".into(), 8, 10.0).await.unwrap();
    assert_eq!(hits[0].image_path, "blue.jpg");
    assert_eq!(hits.len(), 2);

    let err = context.search_text("".into(), 8, 10.0).await.unwrap_err();
    assert!(err.is_client_error());
    let err = context
        .search_image(solid_image([255, 0, 0]), 0, 10.0)
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}
