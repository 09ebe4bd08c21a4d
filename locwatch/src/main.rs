//! locwatch - replay recorded workspace status and captured logs.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use locwatch::replay::{replay_logs, replay_status};
use locwatch_common::logging::init_logging;
use locwatch_common::{IoType, LocwatchConfig};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "locwatch")]
#[command(author, version, about = "Code-location status and captured-log watcher")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "LOCWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded status snapshots (JSON lines) and print decided notifications
    ReplayStatus {
        /// Recording to replay
        file: PathBuf,
    },
    /// Replay recorded log chunks (JSON lines) and print the final view
    ReplayLogs {
        /// Recording to replay
        file: PathBuf,

        /// Stream to print
        #[arg(long, default_value = "stdout")]
        io: IoType,

        /// Override the per-stream buffer ceiling
        #[arg(long)]
        max_bytes: Option<usize>,
    },
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    Ok(BufReader::new(file))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LocwatchConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_logging(&config.logging)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::ReplayStatus { file } => {
            info!("Replaying status recording {:?}", file);
            let replay = replay_status(open(&file)?).await?;
            for notification in &replay.notifications {
                writeln!(out, "{}", serde_json::to_string(notification)?)?;
            }
            let summary = serde_json::json!({
                "summary": replay.summary.map(|status| serde_json::json!({
                    "busy": status.busy,
                    "error_count": status.error_count,
                    "message": status.message(),
                })),
                "entries": replay.entries,
            });
            writeln!(out, "{}", serde_json::to_string(&summary)?)?;
        }
        Commands::ReplayLogs {
            file,
            io,
            max_bytes,
        } => {
            info!("Replaying log recording {:?}", file);
            let max_bytes = max_bytes.unwrap_or(config.logs.max_bytes);
            let aggregator = replay_logs(open(&file)?, max_bytes, &config.logs.server_root)?;
            let view = aggregator.current_view(io);
            writeln!(out, "{}", serde_json::to_string(&view)?)?;
        }
    }

    Ok(())
}
