//! MCP `search_text` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_text` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchTextParams {
    /// Free-text description of the product to find.
    #[schemars(description = "Natural language description of the product, e.g. 'gold ring with a red stone'")]
    pub query: String,

    /// Maximum number of results. Defaults to the server's text search setting.
    #[schemars(description = "Maximum number of results to return (>= 1). Defaults to 8.")]
    pub top_k: Option<usize>,

    /// Minimum match percent (0–100).
    #[schemars(description = "Minimum match percent (0-100). Defaults to 10.")]
    pub min_percent: Option<f64>,
}
