//! MCP `predict_files` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `predict_files` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct PredictFilesParams {
    /// Paths touched most recently; never returned as predictions.
    #[schemars(description = "Recently used file paths (most relevant context for prediction)")]
    pub recent_paths: Option<Vec<String>>,

    #[schemars(description = "Current working directory")]
    pub current_directory: Option<String>,

    /// Hour of day (0–23). Enables time-of-day ranking of frequently used files.
    #[schemars(description = "Hour of day (0-23, UTC) for time-of-day ranking")]
    pub hour: Option<u32>,

    /// Maximum number of predictions. Defaults to `prediction.default_max_results`.
    #[schemars(description = "Maximum number of predictions to return. Defaults to 5.")]
    pub max_results: Option<usize>,
}
