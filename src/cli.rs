use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "replaybox")]
#[command(about = "Durable outbox with deterministic replay", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides REPLAYBOX_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the operator API with periodic and connectivity-driven replay
    Serve,
    /// Persist a request for later replay without attempting it
    Enqueue(EnqueueArgs),
    /// List stored entries
    List(ListArgs),
    /// Show one entry as JSON
    Show { id: String },
    /// Re-arm a failed entry
    Retry { id: String },
    /// Delete one entry
    Remove { id: String },
    /// Delete every entry
    Clear,
    /// Drain pending entries once and print the summary
    Replay(ReplayArgs),
    /// Print engine state and per-status counts
    Status,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
pub struct EnqueueArgs {
    pub url: String,

    #[arg(short = 'X', long, default_value = "POST")]
    pub method: String,

    /// Request header as `Name: value`; repeatable
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    #[arg(long)]
    pub id: Option<String>,

    #[arg(long)]
    pub idempotency_key: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only entries with this status (pending, processing, failed)
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub stop_on_error: bool,
}

/// Split `Name: value` into its parts
pub fn parse_header(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
