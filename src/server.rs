//! HTTP and MCP server startup.
//!
//! [`serve_http`] exposes the catalog searches as multipart HTTP endpoints (plus
//! MCP over Streamable HTTP at `/mcp`); [`serve_stdio`] exposes them as MCP
//! tools over stdio. Both share one [`SearchContext`] built at startup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rmcp::ServiceExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use lustre::background::BackgroundRemover;
use lustre::config::LustreConfig;
use lustre::context::{self, SearchContext};
use lustre::error::ServiceError;
use lustre::search::Hit;

use crate::tools::LustreTools;

/// Shared setup: load the model, index, and metadata once.
fn setup_shared_state(config: LustreConfig) -> Result<(Arc<SearchContext>, Arc<LustreConfig>)> {
    let context = SearchContext::initialize(&config)?;
    tracing::info!(index_size = context.index_size(), "search context ready");
    Ok((Arc::new(context), Arc::new(config)))
}

fn release(context: Arc<SearchContext>) {
    match Arc::try_unwrap(context) {
        Ok(context) => context.shutdown(),
        Err(_) => tracing::warn!("search context still shared at shutdown; dropping"),
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: LustreConfig) -> Result<()> {
    tracing::info!("starting Lustre MCP server on stdio");

    let (context, config) = setup_shared_state(config)?;

    let tools = LustreTools::new(Arc::clone(&context), config);
    let server = tools.serve(rmcp::transport::stdio()).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    release(context);
    Ok(())
}

// ── HTTP ──────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    context: Arc<SearchContext>,
    background: Option<Arc<BackgroundRemover>>,
    config: Arc<LustreConfig>,
}

/// Start the HTTP server with search, background removal, static images, and MCP.
pub async fn serve_http(config: LustreConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting Lustre HTTP server");

    let (context, config) = setup_shared_state(config)?;

    let background = if config.background.enabled {
        match BackgroundRemover::new(&config.background, &config.resolved_model_dir()) {
            Ok(remover) => Some(Arc::new(remover)),
            Err(e) => {
                tracing::warn!(error = %e, "background removal disabled");
                None
            }
        }
    } else {
        None
    };

    let state = AppState {
        context: Arc::clone(&context),
        background,
        config: Arc::clone(&config),
    };
    let router = build_router(state, config.resolved_images_dir());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr} (MCP at /mcp)");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    release(context);
    Ok(())
}

fn build_router(state: AppState, images_dir: PathBuf) -> Router {
    let mcp_context = Arc::clone(&state.context);
    let mcp_config = Arc::clone(&state.config);
    let mcp = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(LustreTools::new(mcp_context.clone(), mcp_config.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/healthz", get(healthz))
        .route("/search/image", post(search_image))
        .route("/search/text", post(search_text))
        .route("/search/hybrid", post(search_hybrid))
        .route("/bgremover", post(remove_background))
        .nest_service("/images", ServeDir::new(images_dir))
        .nest_service("/mcp", mcp)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}

/// A [`ServiceError`] rendered as a JSON `{"error": ...}` response.
#[derive(Debug)]
struct HttpError(ServiceError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Embedding(_) | ServiceError::Index(_) | ServiceError::Internal(_) => {
                tracing::error!(error = %self.0, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ServiceError> for HttpError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<axum::extract::multipart::MultipartError> for HttpError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self(ServiceError::InvalidInput(err.to_string()))
    }
}

fn bad_request(message: impl Into<String>) -> HttpError {
    HttpError(ServiceError::InvalidInput(message.into()))
}

/// Which endpoint a form is read for. Hybrid search has no threshold, so its
/// forms never parse `min_percent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormKind {
    Single,
    Hybrid,
}

/// Multipart fields accepted by the search endpoints. Unknown fields are ignored.
#[derive(Debug, Default)]
struct SearchForm {
    file: Option<Bytes>,
    query: Option<String>,
    top_k: Option<usize>,
    min_percent: Option<f64>,
}

impl SearchForm {
    async fn read(mut multipart: Multipart, kind: FormKind) -> Result<Self, HttpError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => form.file = Some(field.bytes().await?),
                "query" | "top_k" | "min_percent" => {
                    let value = field.text().await?;
                    form.set_text_field(&name, value, kind)?;
                }
                _ => tracing::debug!(field = %name, "ignoring form field"),
            }
        }
        Ok(form)
    }

    fn set_text_field(&mut self, name: &str, value: String, kind: FormKind) -> Result<(), HttpError> {
        match name {
            "query" => self.query = Some(value),
            "top_k" => self.top_k = Some(parse_field(name, &value)?),
            "min_percent" if kind == FormKind::Single => {
                self.min_percent = Some(parse_field(name, &value)?)
            }
            _ => tracing::debug!(field = %name, "ignoring form field"),
        }
        Ok(())
    }

    fn require_file(&mut self) -> Result<Bytes, HttpError> {
        self.file
            .take()
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| bad_request("missing 'file' field"))
    }

    fn require_query(&mut self) -> Result<String, HttpError> {
        self.query
            .take()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| bad_request("missing 'query' field"))
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, HttpError> {
    value
        .trim()
        .parse()
        .map_err(|_| bad_request(format!("invalid value for '{name}': {value:?}")))
}

/// `top_k`/`min_percent` may also arrive as query parameters.
#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    top_k: Option<usize>,
    min_percent: Option<f64>,
}

/// Hybrid query parameters; any `min_percent` is left unparsed.
#[derive(Debug, Default, Deserialize)]
struct HybridParams {
    top_k: Option<usize>,
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": "ok", "index_size": state.context.index_size() }))
}

async fn search_image(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    multipart: Multipart,
) -> Result<Json<Vec<Hit>>, HttpError> {
    let mut form = SearchForm::read(multipart, FormKind::Single).await?;
    let image = context::decode_query_image(&form.require_file()?)?;
    let defaults = &state.config.search;
    let top_k = form.top_k.or(params.top_k).unwrap_or(defaults.image_top_k);
    let min_percent = form
        .min_percent
        .or(params.min_percent)
        .unwrap_or(defaults.image_min_percent);

    let hits = state.context.search_image(image, top_k, min_percent).await?;
    tracing::info!(top_k, min_percent, hits = hits.len(), "image search");
    Ok(Json(hits))
}

async fn search_text(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
    multipart: Multipart,
) -> Result<Json<Vec<Hit>>, HttpError> {
    let mut form = SearchForm::read(multipart, FormKind::Single).await?;
    let query = form.require_query()?;
    let defaults = &state.config.search;
    let top_k = form.top_k.or(params.top_k).unwrap_or(defaults.text_top_k);
    let min_percent = form
        .min_percent
        .or(params.min_percent)
        .unwrap_or(defaults.text_min_percent);

    tracing::info!(query = %query, top_k, min_percent, "text search");
    let hits = state.context.search_text(query, top_k, min_percent).await?;
    Ok(Json(hits))
}

async fn search_hybrid(
    State(state): State<AppState>,
    Query(params): Query<HybridParams>,
    multipart: Multipart,
) -> Result<Json<Vec<Hit>>, HttpError> {
    let mut form = SearchForm::read(multipart, FormKind::Hybrid).await?;
    let image = context::decode_query_image(&form.require_file()?)?;
    let query = form.require_query()?;
    let top_k = form
        .top_k
        .or(params.top_k)
        .unwrap_or(state.config.search.hybrid_top_k);

    tracing::info!(query = %query, top_k, "hybrid search");
    let hits = state.context.search_hybrid(image, query, top_k).await?;
    Ok(Json(hits))
}

async fn remove_background(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let remover = state
        .background
        .clone()
        .ok_or_else(|| HttpError(ServiceError::Unavailable("background removal".into())))?;

    let mut form = SearchForm::read(multipart, FormKind::Single).await?;
    let image = context::decode_query_image(&form.require_file()?)?;

    let jpeg = context::run_bounded(
        state.context.settings().timeout,
        "background removal",
        move || {
            remover
                .remove_background(&image)
                .map_err(ServiceError::Internal)
        },
    )
    .await?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}
