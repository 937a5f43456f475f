//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that open the database,
//! start the prediction service, and hand it to the MCP tool handler.

use anyhow::Result;
use rmcp::ServiceExt;

use crate::tools::ExocortexTools;
use exocortex::config::ExocortexConfig;
use exocortex::db;
use exocortex::service::PredictionService;

/// Shared setup: open the DB, check the pinned decay constant, start the service.
pub fn setup_service(config: ExocortexConfig) -> Result<PredictionService> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    // Stored confidences were computed with the pinned constant.
    let stored = db::migrations::pin_decay_constant(&conn, config.patterns.decay_constant)?;
    if (stored - config.patterns.decay_constant).abs() > f64::EPSILON {
        tracing::warn!(
            stored,
            configured = config.patterns.decay_constant,
            "decay constant changed; run `exocortex rebuild` to recompute confidences"
        );
    }

    let service = PredictionService::from_database(db::shared(conn), config);
    if service.spawn_maintenance().is_some() {
        tracing::info!(
            interval_hours = service.config().maintenance.interval_hours,
            "scheduled maintenance enabled"
        );
    }
    Ok(service)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: ExocortexConfig) -> Result<()> {
    tracing::info!("starting Exocortex MCP server on stdio");

    let service = setup_service(config)?;
    let tools = ExocortexTools::new(service);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: ExocortexConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting Exocortex MCP server on HTTP");

    let service = setup_service(config)?;

    let http = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(ExocortexTools::new(service.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", http);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
