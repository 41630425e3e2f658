//! Pairsync - Sync Daemon
//!
//! Runs one master or slave instance with a terminal dashboard.
//!
//! Usage:
//!   cargo run --release -- --config pairsync.json
//!   cargo run --release -- --no-dashboard  # Plain logging mode
//!   cargo run --release -- --role slave    # Override the configured role

mod dashboard;
mod metrics;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pairsync_core::menu::{Menu, MenuAction};
use pairsync_core::{ConfigStore, RoleKind};
use parking_lot::RwLock;

#[derive(Parser)]
#[command(name = "pairsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file, created on the first change if missing
    #[arg(short, long, default_value = "pairsync.json")]
    config: PathBuf,

    /// Plain logging instead of the dashboard
    #[arg(long)]
    no_dashboard: bool,

    /// Run as this role (none, master or slave) and enable sync
    #[arg(short, long)]
    role: Option<RoleKind>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Arc::new(ConfigStore::load_or_default(&args.config)?);
    if let Some(role) = args.role {
        let mut menu = Menu::new();
        menu.apply(&config, MenuAction::SetRole(role));
        config.update(|c| c.enabled = role != RoleKind::Disabled);
    }

    // Shared metrics state
    let metrics = Arc::new(RwLock::new(metrics::Metrics::new()));

    if args.no_dashboard {
        runner::run_with_logging(config, args.config, metrics).await
    } else {
        dashboard::run(config, args.config, metrics).await
    }
}
