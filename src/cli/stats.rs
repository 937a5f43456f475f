use anyhow::Result;

use exocortex::config::ExocortexConfig;
use exocortex::patterns::PatternKind;

/// Display event and pattern statistics in the terminal.
pub async fn stats(config: ExocortexConfig) -> Result<()> {
    let (_db, service) = super::open_service(config)?;
    let stats = service.stats().await?;

    println!("Operation Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total operations:    {}", stats.events.total_operations);
    println!("  Last 7 days:         {}", stats.recent_events.total_operations);
    println!("  Unique files:        {}", stats.events.unique_files);
    println!("  Unique directories:  {}", stats.events.unique_directories);
    if let Some(ref oldest) = stats.events.oldest {
        println!("  Oldest operation:    {oldest}");
    }
    if let Some(ref newest) = stats.events.newest {
        println!("  Newest operation:    {newest}");
    }
    println!();

    println!("Pattern Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total patterns:      {}", stats.patterns.total_patterns);
    println!("  Active:              {}", stats.patterns.active_patterns);
    println!("  Retired:             {}", stats.patterns.retired_patterns);
    println!("  Mean confidence:     {:.4}", stats.patterns.mean_confidence);
    println!("  Hits / misses:       {} / {}", stats.patterns.total_hits, stats.patterns.total_misses);
    println!();

    println!("By Kind:");
    for kind in PatternKind::ALL {
        let count = stats.patterns.by_kind.get(kind.as_str()).copied().unwrap_or(0);
        println!("  {:<20} {}", kind.as_str(), count);
    }

    Ok(())
}
