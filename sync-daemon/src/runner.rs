//! Session setup shared by both front ends

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use crate::metrics::{LogLevel, Metrics, MetricsCallback};
use pairsync_core::{ConfigStore, SyncSession};
use parking_lot::RwLock;
use tracing::{info, warn};

/// Build the session, hook it up to the metrics and start it.
///
/// A start failure is logged, not returned: the user can fix the config
/// from the dashboard and the watcher restarts the session.
pub async fn start_session(
    config: Arc<ConfigStore>,
    config_path: PathBuf,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<SyncSession, Box<dyn Error>> {
    let session = SyncSession::from_config(Arc::clone(&config))?;
    session.set_callback(Arc::new(MetricsCallback::new(Arc::clone(&metrics))));

    metrics.write().config_changed(&config.get());
    spawn_config_saver(Arc::clone(&config), config_path, Arc::clone(&metrics));
    session.watch_config();

    if let Err(e) = session.start().await {
        warn!("Sync did not start: {}", e);
        metrics.write().log(LogLevel::Warning, format!("Sync did not start: {}", e));
    }

    Ok(session)
}

/// Write the config back to disk whenever it changes (menu picks, new tokens)
fn spawn_config_saver(config: Arc<ConfigStore>, path: PathBuf, metrics: Arc<RwLock<Metrics>>) {
    let mut rx = config.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().clone();
            metrics.write().config_changed(&current);

            match config.save(&path) {
                Ok(()) => info!("Saved config to {}", path.display()),
                Err(e) => {
                    warn!("Could not save config: {}", e);
                    metrics.write().log(LogLevel::Warning, format!("Could not save config: {}", e));
                }
            }
        }
    });
}

/// Run without the dashboard, logging to stderr until Ctrl-C
pub async fn run_with_logging(
    config: Arc<ConfigStore>,
    config_path: PathBuf,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), Box<dyn Error>> {
    // Initialize tracing for logging mode
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pairsync=info".parse()?)
                .add_directive("pairsync_core=debug".parse()?)
                .add_directive("hyper_util=off".parse()?)
                .add_directive("reqwest=off".parse()?)
                .add_directive("hyper=off".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Using config {}", config_path.display());
    let session = start_session(config, config_path, metrics).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    session.stop().await;

    Ok(())
}
