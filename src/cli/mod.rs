pub mod doctor;
pub mod maintenance;
pub mod predict;
pub mod stats;

use anyhow::Result;

use exocortex::config::ExocortexConfig;
use exocortex::db::{self, Db};
use exocortex::service::PredictionService;

/// Open the configured database and start a service over it (no scheduled maintenance).
fn open_service(config: ExocortexConfig) -> Result<(Db, PredictionService)> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    db::migrations::pin_decay_constant(&conn, config.patterns.decay_constant)?;
    let db = db::shared(conn);
    let service = PredictionService::from_database(db.clone(), config);
    Ok((db, service))
}
