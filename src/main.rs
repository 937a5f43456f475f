mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exocortex::config::ExocortexConfig;

#[derive(Parser)]
#[command(name = "exocortex", version, about = "Predictive file intelligence MCP server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport by default)
    Serve {
        /// Serve Streamable HTTP on server.host:server.port instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Predict the next files for a set of recently used paths
    Predict {
        /// Recently used file paths
        #[arg(required = true)]
        recent: Vec<String>,
        /// Current working directory
        #[arg(long)]
        dir: Option<String>,
        /// Hour of day (0-23) for time-of-day ranking
        #[arg(long)]
        hour: Option<u32>,
        /// Maximum number of predictions
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
    },
    /// Apply time decay to all patterns
    Decay,
    /// Show event and pattern statistics
    Stats,
    /// Clear all patterns and relearn them from the event log
    Rebuild,
    /// Run database diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = ExocortexConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Predict {
            recent,
            dir,
            hour,
            max_results,
        } => {
            cli::predict::predict(config, recent, dir, hour, max_results).await?;
        }
        Command::Decay => {
            cli::maintenance::decay(config).await?;
        }
        Command::Stats => {
            cli::stats::stats(config).await?;
        }
        Command::Rebuild => {
            cli::maintenance::rebuild(config).await?;
        }
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
