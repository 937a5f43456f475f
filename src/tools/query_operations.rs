//! MCP `query_operations` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `query_operations` MCP tool. All filters are optional.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryOperationsParams {
    #[schemars(description = "Only operations on this exact file path")]
    pub file_path: Option<String>,

    #[schemars(description = "Only operations in this directory")]
    pub directory_path: Option<String>,

    #[schemars(description = "Only this operation type (e.g. 'read', 'write')")]
    pub operation_type: Option<String>,

    #[schemars(description = "Only operations from this session")]
    pub session_id: Option<String>,

    #[schemars(description = "Only operations from this device")]
    pub device_id: Option<String>,

    /// Inclusive lower bound (RFC 3339).
    #[schemars(description = "Start of the time range, inclusive (RFC 3339)")]
    pub since: Option<String>,

    /// Exclusive upper bound (RFC 3339).
    #[schemars(description = "End of the time range, exclusive (RFC 3339)")]
    pub until: Option<String>,

    /// Maximum number of operations (1–1000). Defaults to 100.
    #[schemars(description = "Maximum number of operations to return (1-1000). Defaults to 100.")]
    pub limit: Option<usize>,
}
