//! MCP `record_operation` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `record_operation` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecordOperationParams {
    /// Full path of the file that was touched.
    #[schemars(description = "Full path of the file that was operated on")]
    pub file_path: String,

    /// `"create"`, `"read"`, `"write"`, `"delete"`, `"rename"`, `"move"` (also `open`, `save`, `modify`, `copy`).
    #[schemars(
        description = "Operation: 'create', 'read', 'write', 'delete', 'rename', 'move' (aliases: 'open', 'save', 'modify', 'copy')"
    )]
    pub operation_type: String,

    /// RFC 3339 timestamp. Defaults to now.
    #[schemars(description = "When the operation happened (RFC 3339). Defaults to now.")]
    pub timestamp: Option<String>,

    #[schemars(description = "File size in bytes")]
    pub file_size: Option<u64>,

    /// Session that groups related operations for pattern mining.
    #[schemars(description = "Session id. Operations are only paired with others from the same session.")]
    pub session_id: Option<String>,

    #[schemars(description = "Device id, used to group operations that have no session")]
    pub device_id: Option<String>,

    /// Free-form context (application, window title, ...).
    #[schemars(description = "Optional JSON object with additional context")]
    pub context: Option<serde_json::Map<String, serde_json::Value>>,
}
