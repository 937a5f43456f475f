//! CLI `predict` command: print ranked predictions for a context.

use anyhow::Result;

use exocortex::config::ExocortexConfig;
use exocortex::predict::{PredictionContext, PredictionStatus};

pub async fn predict(
    config: ExocortexConfig,
    recent: Vec<String>,
    dir: Option<String>,
    hour: Option<u32>,
    max_results: Option<usize>,
) -> Result<()> {
    if let Some(h) = hour {
        anyhow::ensure!(h < 24, "hour must be between 0 and 23");
    }
    let (_db, service) = super::open_service(config)?;

    let context = PredictionContext {
        recent_paths: recent,
        current_directory: dir,
        hour,
    };
    let set = service.predict(context, max_results).await?;

    if set.status == PredictionStatus::NoPatternsAvailable {
        println!("No patterns apply to this context yet.");
        return Ok(());
    }

    println!("{:<6} {:<10} {:<40} {}", "Rank", "Confidence", "Kinds", "Path");
    println!("{}", "-".repeat(90));
    for (i, p) in set.predictions.iter().enumerate() {
        let kinds: Vec<&str> = p.kinds.iter().map(|k| k.as_str()).collect();
        println!(
            "{:<6} {:<10.4} {:<40} {}",
            i + 1,
            p.confidence,
            kinds.join(","),
            p.path
        );
    }
    Ok(())
}
