//! Slave control endpoint
//!
//! A small HTTP server that accepts commands from the master and forwards
//! them to the local player. It never initiates anything itself.

mod auth;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use auth::{AuthRejection, Authorized, TokenRegistry, MAX_ISSUED_TOKENS, TOKEN_LENGTH};
pub use routes::router;

use crate::config::ConfigStore;
use crate::player::Player;
use crate::sync::SyncEvents;

/// Everything the handlers need
#[derive(Clone)]
pub struct ServerState {
    pub player: Arc<dyn Player>,
    pub config: Arc<ConfigStore>,
    pub tokens: Arc<TokenRegistry>,
    pub events: Arc<SyncEvents>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A running control endpoint
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Control endpoint task failed: {}", e);
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Bind `host:port` and serve the control API in the background
pub async fn serve(host: &str, port: u16, state: ServerState) -> Result<ServerHandle, ServerError> {
    let addr = format!("{}:{}", host, port);
    let bind_error = |source| ServerError::Bind {
        addr: addr.clone(),
        source,
    };

    let listener = TcpListener::bind((host, port)).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    let app = router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        info!("Control endpoint listening on {}", local_addr);
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            warn!("Control endpoint error: {}", e);
        }
        info!("Control endpoint stopped");
    });

    Ok(ServerHandle {
        local_addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}
