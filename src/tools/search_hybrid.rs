//! MCP `search_hybrid` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_hybrid` MCP tool.
///
/// Results must match both the image and the text; there is no percent threshold.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchHybridParams {
    #[schemars(description = "Filesystem path of the query image (JPEG, PNG or WebP)")]
    pub image_path: String,

    #[schemars(description = "Text that refines the image query, e.g. 'in silver'")]
    pub query: String,

    #[schemars(description = "Maximum number of results to return (>= 1). Defaults to 10.")]
    pub top_k: Option<usize>,
}
