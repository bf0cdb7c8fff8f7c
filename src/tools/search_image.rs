//! MCP `search_image` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_image` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchImageParams {
    /// Path of a query image readable by the server process.
    #[schemars(description = "Filesystem path of the query image (JPEG, PNG or WebP)")]
    pub image_path: String,

    #[schemars(description = "Maximum number of results to return (>= 1). Defaults to 8.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Minimum match percent (0-100). Defaults to 80.")]
    pub min_percent: Option<f64>,
}
