//! MCP `prediction_stats` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `prediction_stats` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PredictionStatsParams {
    /// Include the strongest patterns of each kind.
    #[schemars(description = "If true, include the top patterns (by confidence) in the response")]
    pub include_top_patterns: Option<bool>,
}
