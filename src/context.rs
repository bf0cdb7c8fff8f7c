//! Process-wide query state.
//!
//! [`SearchContext::initialize`] loads the embedding model, the index with its
//! identifier map, and the metadata snapshot exactly once. The context is then
//! shared (usually behind an `Arc`) by every transport and consumed by
//! [`SearchContext::shutdown`] when the process stops.

use anyhow::{Context, Result};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::MetadataStore;
use crate::config::{LustreConfig, SearchConfig};
use crate::db;
use crate::embedding::{self, preprocess, Embedder, EmbeddingVector};
use crate::error::ServiceError;
use crate::index::storage::IndexStorage;
use crate::index::NearestNeighbors;
use crate::search::{self, Corpus, Hit};

/// Query knobs that are not per-request.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub candidate_pool: usize,
    pub timeout: Duration,
}

impl QuerySettings {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            candidate_pool: config.candidate_pool.max(1),
            timeout: Duration::from_secs(config.query_timeout_secs.max(1)),
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

pub struct SearchContext {
    embedder: Arc<dyn Embedder>,
    corpus: Corpus,
    settings: QuerySettings,
}

impl SearchContext {
    pub fn initialize(config: &LustreConfig) -> Result<Self> {
        let storage = IndexStorage::new(
            config.resolved_index_path(),
            config.resolved_id_map_path(),
        );
        anyhow::ensure!(
            storage.exists(),
            "no index at {}. Run `lustre index build` first.",
            storage.index_path().display()
        );
        let (index, id_map) = storage.load().context("failed to load catalog index")?;
        tracing::info!(
            vectors = index.len(),
            dimensions = index.dimensions(),
            path = %storage.index_path().display(),
            "index loaded"
        );

        let conn = db::open_database(config.resolved_db_path())?;
        if let Some(indexed_with) = db::migrations::get_embedding_model(&conn)? {
            if indexed_with != config.embedding.model {
                tracing::warn!(
                    indexed_with = %indexed_with,
                    configured = %config.embedding.model,
                    "index was built with a different embedding model; rebuild it"
                );
            }
        }
        let metadata = MetadataStore::load(&conn)?;
        drop(conn);

        let embedder: Arc<dyn Embedder> = Arc::from(embedding::create_provider(&config.embedding)?);
        anyhow::ensure!(
            embedder.dimensions() == index.dimensions(),
            "embedder produces {} dimensions but the index holds {}",
            embedder.dimensions(),
            index.dimensions()
        );

        let corpus = Corpus::new(Arc::new(index), Arc::new(id_map), Arc::new(metadata))?;
        Ok(Self::from_parts(
            embedder,
            corpus,
            QuerySettings::from_config(&config.search),
        ))
    }

    /// Assemble a context from already-loaded parts.
    pub fn from_parts(embedder: Arc<dyn Embedder>, corpus: Corpus, settings: QuerySettings) -> Self {
        Self {
            embedder,
            corpus,
            settings,
        }
    }

    /// Release the model sessions and the loaded index.
    pub fn shutdown(self) {
        let vectors = self.corpus.len();
        drop(self);
        tracing::info!(vectors, "search context released");
    }

    pub fn index_size(&self) -> usize {
        self.corpus.len()
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub async fn search_image(
        &self,
        image: DynamicImage,
        top_k: usize,
        min_percent: f64,
    ) -> Result<Vec<Hit>, ServiceError> {
        validate_top_k(top_k)?;
        let query = self.embed_image(image).await?;
        let corpus = self.corpus.clone();
        self.run_blocking("image search", move || {
            search::search_single(&corpus, &query, top_k, min_percent).map_err(ServiceError::Index)
        })
        .await
    }

    pub async fn search_text(
        &self,
        text: String,
        top_k: usize,
        min_percent: f64,
    ) -> Result<Vec<Hit>, ServiceError> {
        validate_top_k(top_k)?;
        validate_text(&text)?;
        let query = self.embed_text(text).await?;
        let corpus = self.corpus.clone();
        self.run_blocking("text search", move || {
            search::search_single(&corpus, &query, top_k, min_percent).map_err(ServiceError::Index)
        })
        .await
    }

    /// Both embeddings run concurrently; either failing fails the request.
    pub async fn search_hybrid(
        &self,
        image: DynamicImage,
        text: String,
        top_k: usize,
    ) -> Result<Vec<Hit>, ServiceError> {
        validate_top_k(top_k)?;
        validate_text(&text)?;
        let (image_query, text_query) =
            tokio::try_join!(self.embed_image(image), self.embed_text(text))?;

        let corpus = self.corpus.clone();
        let pool = self.settings.candidate_pool;
        self.run_blocking("hybrid search", move || {
            search::search_hybrid(&corpus, &image_query, &text_query, top_k, pool)
                .map_err(ServiceError::Index)
        })
        .await
    }

    async fn embed_image(&self, image: DynamicImage) -> Result<EmbeddingVector, ServiceError> {
        let embedder = Arc::clone(&self.embedder);
        self.run_blocking("image embedding", move || {
            embedder.embed_image(&image).map_err(ServiceError::Embedding)
        })
        .await
    }

    async fn embed_text(&self, text: String) -> Result<EmbeddingVector, ServiceError> {
        let embedder = Arc::clone(&self.embedder);
        self.run_blocking("text embedding", move || {
            embedder.embed_text(&text).map_err(ServiceError::Embedding)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, operation: &'static str, work: F) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        run_bounded(self.settings.timeout, operation, work).await
    }
}

/// Run CPU-bound work off the async runtime, bounded by `timeout`.
///
/// The blocking thread cannot be interrupted; on timeout the caller gets an
/// error while the work finishes in the background and its result is dropped.
pub async fn run_bounded<T, F>(
    timeout: Duration,
    operation: &'static str,
    work: F,
) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => {
            tracing::warn!(operation, "query timed out");
            Err(ServiceError::Timeout {
                operation,
                secs: timeout.as_secs(),
            })
        }
    }
}

/// Decode an uploaded query image, classifying failure as bad input.
pub fn decode_query_image(bytes: &[u8]) -> Result<DynamicImage, ServiceError> {
    preprocess::decode_image(bytes).map_err(|e| ServiceError::InvalidInput(format!("{e:#}")))
}

fn validate_top_k(top_k: usize) -> Result<(), ServiceError> {
    if top_k == 0 {
        return Err(ServiceError::InvalidInput("top_k must be at least 1".into()));
    }
    Ok(())
}

fn validate_text(text: &str) -> Result<(), ServiceError> {
    if text.trim().is_empty() {
        return Err(ServiceError::InvalidInput("query text is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_never_zero() {
        let settings = QuerySettings::from_config(&SearchConfig {
            candidate_pool: 0,
            query_timeout_secs: 0,
            ..Default::default()
        });
        assert_eq!(settings.candidate_pool, 1);
        assert_eq!(settings.timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn slow_work_times_out() {
        let result: Result<(), ServiceError> =
            run_bounded(Duration::from_millis(20), "sleep", || {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Timeout { operation: "sleep", .. })
        ));
    }

    #[tokio::test]
    async fn errors_from_work_pass_through() {
        let result: Result<(), ServiceError> = run_bounded(Duration::from_secs(5), "fail", || {
            Err(ServiceError::InvalidInput("nope".into()))
        })
        .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[test]
    fn undecodable_upload_is_invalid_input() {
        let err = decode_query_image(b"garbage").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn initialize_without_index_points_at_build_command() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = LustreConfig::default();
        config.storage = crate::config::StorageConfig::rooted_at(tmp.path());
        let err = SearchContext::initialize(&config).err().unwrap();
        assert!(err.to_string().contains("lustre index build"));
    }
}
