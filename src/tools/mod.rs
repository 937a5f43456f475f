pub mod decay_patterns;
pub mod predict_files;
pub mod prediction_stats;
pub mod query_operations;
pub mod record_operation;

use chrono::{DateTime, Utc};
use decay_patterns::DecayPatternsParams;
use predict_files::PredictFilesParams;
use prediction_stats::PredictionStatsParams;
use query_operations::QueryOperationsParams;
use record_operation::RecordOperationParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};

use exocortex::events::{EventFilter, EventInput, OperationKind, TimeRange};
use exocortex::predict::PredictionContext;
use exocortex::service::PredictionService;

const DEFAULT_QUERY_LIMIT: usize = 100;
const MAX_QUERY_LIMIT: usize = 1000;
const TOP_PATTERNS: usize = 10;

/// The Exocortex MCP tool handler. Holds the shared prediction service and exposes
/// all MCP tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct ExocortexTools {
    tool_router: ToolRouter<Self>,
    service: PredictionService,
}

fn parse_time(field: &str, value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("{field} must be an RFC 3339 timestamp: {e}"))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl ExocortexTools {
    pub fn new(service: PredictionService) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }

    /// Record a file operation in the event log.
    #[tool(description = "Record a file operation (create/read/write/delete/rename/move). Duplicate (timestamp, path, operation) records are detected and not counted twice.")]
    async fn record_operation(
        &self,
        Parameters(params): Parameters<RecordOperationParams>,
    ) -> Result<String, String> {
        let timestamp = params
            .timestamp
            .as_deref()
            .map(|t| parse_time("timestamp", t))
            .transpose()?;

        let input = EventInput {
            timestamp,
            operation_kind: Some(params.operation_type),
            file_path: Some(params.file_path),
            size: params.file_size,
            session_id: params.session_id,
            device_id: params.device_id,
            context: params.context.map(|c| c.into_iter().collect()),
            ..Default::default()
        };

        let recorded = self
            .service
            .record(input)
            .await
            .map_err(|e| format!("record failed: {e}"))?;

        tracing::info!(id = %recorded.id, duplicate = recorded.duplicate, "operation recorded");
        to_json(&recorded)
    }

    /// Predict the files most likely to be needed next.
    #[tool(description = "Predict the files most likely to be used next, given recently used paths, the current directory, and optionally the hour of day. Returns ranked paths with confidence in [0, 1].")]
    async fn predict_files(
        &self,
        Parameters(params): Parameters<PredictFilesParams>,
    ) -> Result<String, String> {
        if let Some(hour) = params.hour {
            if hour > 23 {
                return Err("hour must be between 0 and 23".into());
            }
        }

        let context = PredictionContext {
            recent_paths: params.recent_paths.unwrap_or_default(),
            current_directory: params.current_directory,
            hour: params.hour,
        };
        tracing::info!(recent = context.recent_paths.len(), "predict_files called");

        let set = self
            .service
            .predict(context, params.max_results)
            .await
            .map_err(|e| format!("prediction failed: {e}"))?;
        to_json(&set)
    }

    /// Query the operation log.
    #[tool(description = "Query recorded file operations by path, directory, operation type, session, device, and time range. Results are ordered oldest first.")]
    async fn query_operations(
        &self,
        Parameters(params): Parameters<QueryOperationsParams>,
    ) -> Result<String, String> {
        let operation_kind = params
            .operation_type
            .as_deref()
            .map(|k| k.parse::<OperationKind>())
            .transpose()?;

        let filter = EventFilter {
            file_path: params.file_path,
            directory_path: params.directory_path,
            operation_kind,
            session_id: params.session_id,
            device_id: params.device_id,
            stream: None,
        };
        let range = TimeRange {
            start: params.since.as_deref().map(|t| parse_time("since", t)).transpose()?,
            end: params.until.as_deref().map(|t| parse_time("until", t)).transpose()?,
        };
        let limit = params
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT);

        let events = self
            .service
            .query(filter, range, limit)
            .await
            .map_err(|e| format!("query failed: {e}"))?;

        Ok(serde_json::json!({
            "operations": events,
            "total": events.len(),
        })
        .to_string())
    }

    /// Apply time decay to all patterns.
    #[tool(description = "Apply time-based confidence decay to all patterns and retire those that fall below the confidence floor. Idempotent for the same time.")]
    async fn decay_patterns(
        &self,
        Parameters(params): Parameters<DecayPatternsParams>,
    ) -> Result<String, String> {
        let now = match params.now.as_deref() {
            Some(t) => parse_time("now", t)?,
            None => Utc::now(),
        };

        let decay = self
            .service
            .decay(now)
            .await
            .map_err(|e| format!("decay failed: {e}"))?;

        let feedback = if params.sweep.unwrap_or(true) {
            Some(
                self.service
                    .sweep(now)
                    .await
                    .map_err(|e| format!("sweep failed: {e}"))?,
            )
        } else {
            None
        };

        Ok(serde_json::json!({
            "decay": decay,
            "feedback": feedback,
        })
        .to_string())
    }

    /// Get statistics about recorded operations and learned patterns.
    #[tool(description = "Get statistics: operation counts (all time and last 7 days), unique files and directories, pattern counts by kind, hit/miss totals, and outstanding predictions.")]
    async fn prediction_stats(
        &self,
        Parameters(params): Parameters<PredictionStatsParams>,
    ) -> Result<String, String> {
        let stats = self
            .service
            .stats()
            .await
            .map_err(|e| format!("stats failed: {e}"))?;

        if !params.include_top_patterns.unwrap_or(false) {
            return to_json(&stats);
        }

        let top = self
            .service
            .patterns(None, 0.0, TOP_PATTERNS)
            .await
            .map_err(|e| format!("pattern listing failed: {e}"))?;

        Ok(serde_json::json!({
            "stats": stats,
            "top_patterns": top,
        })
        .to_string())
    }
}

#[tool_handler]
impl ServerHandler for ExocortexTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Exocortex learns how files are used together. Use record_operation for every \
                 file operation, predict_files to get the files likely needed next, and \
                 prediction_stats to see what has been learned."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
