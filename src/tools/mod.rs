pub mod search_hybrid;
pub mod search_image;
pub mod search_text;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_hybrid::SearchHybridParams;
use search_image::SearchImageParams;
use search_text::SearchTextParams;
use std::sync::Arc;

use lustre::config::LustreConfig;
use lustre::context::{self, SearchContext};
use lustre::error::ServiceError;
use lustre::search::Hit;

/// The Lustre MCP tool handler. Holds the shared search context and config and
/// exposes the three catalog searches via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct LustreTools {
    tool_router: ToolRouter<Self>,
    context: Arc<SearchContext>,
    config: Arc<LustreConfig>,
}

#[tool_router]
impl LustreTools {
    pub fn new(context: Arc<SearchContext>, config: Arc<LustreConfig>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            context,
            config,
        }
    }

    /// Find catalog products matching a text description.
    #[tool(description = "Search the product catalog by text description. Returns ranked hits with match_percent, image_path, sku and title.")]
    async fn search_text(
        &self,
        Parameters(params): Parameters<SearchTextParams>,
    ) -> Result<String, String> {
        let top_k = params.top_k.unwrap_or(self.config.search.text_top_k);
        let min_percent = params
            .min_percent
            .unwrap_or(self.config.search.text_min_percent);
        tracing::info!(query = %params.query, top_k, min_percent, "search_text called");

        let hits = self
            .context
            .search_text(params.query, top_k, min_percent)
            .await
            .map_err(tool_error)?;
        render(&hits)
    }

    /// Find catalog products that look like an image on disk.
    #[tool(description = "Search the product catalog with a query image given as a file path. Returns visually similar products.")]
    async fn search_image(
        &self,
        Parameters(params): Parameters<SearchImageParams>,
    ) -> Result<String, String> {
        let top_k = params.top_k.unwrap_or(self.config.search.image_top_k);
        let min_percent = params
            .min_percent
            .unwrap_or(self.config.search.image_min_percent);
        tracing::info!(image = %params.image_path, top_k, min_percent, "search_image called");

        let image = read_query_image(&params.image_path).await?;
        let hits = self
            .context
            .search_image(image, top_k, min_percent)
            .await
            .map_err(tool_error)?;
        render(&hits)
    }

    /// Image + text search keeping only products that match both.
    #[tool(description = "Search with both a query image (file path) and text. Only products found by both the image and the text search are returned, ranked by combined score.")]
    async fn search_hybrid(
        &self,
        Parameters(params): Parameters<SearchHybridParams>,
    ) -> Result<String, String> {
        let top_k = params.top_k.unwrap_or(self.config.search.hybrid_top_k);
        tracing::info!(
            image = %params.image_path,
            query = %params.query,
            top_k,
            "search_hybrid called"
        );

        let image = read_query_image(&params.image_path).await?;
        let hits = self
            .context
            .search_hybrid(image, params.query, top_k)
            .await
            .map_err(tool_error)?;
        render(&hits)
    }
}

async fn read_query_image(path: &str) -> Result<image::DynamicImage, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read image {path}: {e}"))?;
    context::decode_query_image(&bytes).map_err(tool_error)
}

fn tool_error(err: ServiceError) -> String {
    if !err.is_client_error() {
        tracing::error!(error = %err, "tool call failed");
    }
    err.to_string()
}

fn render(hits: &[Hit]) -> Result<String, String> {
    serde_json::to_string(hits).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_handler]
impl ServerHandler for LustreTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Lustre searches a product image catalog. Use search_text for descriptions, \
                 search_image for a query photo, and search_hybrid to refine a photo with text."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
