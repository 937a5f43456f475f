//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use exocortex::config::ExocortexConfig;
use exocortex::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &ExocortexConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `exocortex serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;
    let stored_k = db::migrations::get_decay_constant(&conn)?;

    println!("Exocortex Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Decay constant:");
    match stored_k {
        Some(k) => println!("  Stored:          {k}"),
        None => println!("  Stored:          (not set)"),
    }
    println!("  Configured:      {}", config.patterns.decay_constant);
    if let Some(k) = stored_k {
        if (k - config.patterns.decay_constant).abs() > f64::EPSILON {
            println!("  WARNING: mismatch! Run `exocortex rebuild` to recompute confidences.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Operations:      {}", report.operation_count);
    println!("  Patterns:        {}", report.pattern_count);
    println!("  Audit log:       {}", report.log_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.exocortex/exocortex.db");
        println!("  2. Patterns can always be relearned with `exocortex rebuild`.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
