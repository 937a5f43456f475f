//! MCP `decay_patterns` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `decay_patterns` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DecayPatternsParams {
    /// Apply decay as of this instant (RFC 3339). Defaults to now.
    #[schemars(description = "Apply decay as of this time (RFC 3339). Defaults to now. Repeating the same time is a no-op.")]
    pub now: Option<String>,

    /// Also settle expired predictions as misses.
    #[schemars(description = "If true, also settle expired predictions as misses. Defaults to true.")]
    pub sweep: Option<bool>,
}
