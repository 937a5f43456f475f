//! CLI maintenance commands: `decay` and `rebuild` for pattern lifecycle management.

use anyhow::{anyhow, Result};
use chrono::Utc;

use exocortex::config::ExocortexConfig;
use exocortex::db::migrations;

/// Apply time decay as of now, then settle expired predictions.
pub async fn decay(config: ExocortexConfig) -> Result<()> {
    let (_db, service) = super::open_service(config)?;

    println!("Applying pattern decay...");
    let report = service.decay(Utc::now()).await?;

    if report.decayed > 0 {
        println!(
            "  Decayed {} of {} patterns ({} retired).",
            report.decayed, report.examined, report.retired
        );
    } else {
        println!("  No patterns to decay.");
    }
    if report.failed > 0 {
        println!("  {} patterns failed and will be retried next run.", report.failed);
    }

    println!("Decay complete.");
    Ok(())
}

/// Clear all patterns and relearn them from the event log under the configured
/// decay constant, then pin that constant in the database.
pub async fn rebuild(config: ExocortexConfig) -> Result<()> {
    let decay_constant = config.patterns.decay_constant;
    let (db, service) = super::open_service(config)?;

    println!("Rebuilding patterns from the event log...");
    let report = service.rebuild().await?;

    {
        let conn = db.lock().map_err(|e| anyhow!("db lock poisoned: {e}"))?;
        migrations::set_decay_constant(&conn, decay_constant)?;
    }

    println!(
        "  Cleared {} patterns, replayed {} operations ({} failed).",
        report.patterns_cleared, report.events_replayed, report.events_failed
    );
    println!("Rebuild complete (decay constant {decay_constant}).");
    Ok(())
}
