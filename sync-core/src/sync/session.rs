//! Sync session
//!
//! Owns everything a running role needs: the poll driver on the master and
//! the control endpoint on the slave.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::detector::{ChangeDetector, PlannedSync};
use super::events::{SyncCallback, SyncEvents};
use super::status::ConnectionStatus;
use crate::config::{
    ConfigError, ConfigStore, MasterConfig, PeerEndpoint, RoleKind, SlaveConfig, SyncConfig,
    SyncRole,
};
use crate::peer::{HttpTransport, PeerClient, PeerError, RetryPolicy, Transport, TransportError};
use crate::player::{Player, PlayerClient, PlayerError};
use crate::server::{self, ServerError, ServerHandle, ServerState, TokenRegistry};

/// How often a slave probes its master when watching it
pub const MASTER_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Errors returned by [`SyncSession`]
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync is not running as master")]
    NotMaster,

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("Local player error: {0}")]
    Player(#[from] PlayerError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Network setup failed: {0}")]
    Transport(#[from] TransportError),
}

/// Outcome of a manual connection test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTest {
    /// Role the test was run for
    pub role: RoleKind,
    /// Endpoint that was probed, if any
    pub target: Option<PeerEndpoint>,
    pub ok: bool,
    pub message: String,
}

struct Inner {
    config: Arc<ConfigStore>,
    player: Arc<dyn Player>,
    peer: PeerClient,
    events: Arc<SyncEvents>,
    tokens: Arc<TokenRegistry>,
    /// Held for the whole of a tick or master probe; a timer pass that
    /// cannot take it is skipped
    detector: AsyncMutex<ChangeDetector>,
    /// Handle for cancelling the poll loop or master watch
    poll_cancel: Mutex<Option<oneshot::Sender<()>>>,
    server: AsyncMutex<Option<ServerHandle>>,
}

/// Runs the configured role.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SyncSession {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("events", &self.inner.events)
            .finish()
    }
}

impl SyncSession {
    pub fn new(
        config: Arc<ConfigStore>,
        player: Arc<dyn Player>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::with_retry(config, player, transport, RetryPolicy::default())
    }

    pub fn with_retry(
        config: Arc<ConfigStore>,
        player: Arc<dyn Player>,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Self {
        let peer = PeerClient::new(transport, Arc::clone(&config)).with_retry(retry);
        Self {
            inner: Arc::new(Inner {
                config,
                player,
                peer,
                events: Arc::new(SyncEvents::new()),
                tokens: Arc::new(TokenRegistry::new()),
                detector: AsyncMutex::new(ChangeDetector::new()),
                poll_cancel: Mutex::new(None),
                server: AsyncMutex::new(None),
            }),
        }
    }

    /// Session talking to the real player and peer over HTTP
    pub fn from_config(config: Arc<ConfigStore>) -> Result<Self, SessionError> {
        let player = PlayerClient::new(&config.get().player)?;
        let transport = HttpTransport::new()?;
        Ok(Self::new(config, Arc::new(player), Arc::new(transport)))
    }

    pub fn set_callback(&self, callback: Arc<dyn SyncCallback>) {
        self.inner.events.set_callback(callback);
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.inner.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.events.status().current()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.events.status().last_error()
    }

    pub fn subscribe_status(&self) -> tokio::sync::watch::Receiver<ConnectionStatus> {
        self.inner.events.status().subscribe()
    }

    /// Whether a periodic loop (master polling or master watch) is running
    pub fn is_running(&self) -> bool {
        self.inner.poll_cancel.lock().is_some()
    }

    /// Bound address of the control endpoint, when running as slave
    pub async fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.server.lock().await.as_ref().map(|s| s.local_addr())
    }

    /// Start whatever role the configuration asks for
    pub async fn start(&self) -> Result<(), SessionError> {
        self.shutdown().await;

        let config = self.inner.config.get();
        match &config.role {
            SyncRole::Master(master) if config.enabled => self.start_master(master),
            SyncRole::Slave(slave) if config.enabled => self.start_slave(slave).await,
            _ => {
                info!("Sync is disabled");
                self.inner.events.disconnected();
                Ok(())
            }
        }
    }

    fn start_master(&self, master: &MasterConfig) -> Result<(), SessionError> {
        if let Err(e) = master.validate() {
            warn!("Cannot start master: {}", e);
            self.inner.events.failed(e.to_string());
            return Err(e.into());
        }

        info!(
            "Starting master sync to {} every {}ms",
            master.peer, master.sync_interval_ms
        );
        self.inner.events.connecting();
        self.start_loop(
            "Sync loop",
            Duration::from_millis(master.sync_interval_ms),
            |inner| async move { inner.tick().await },
        );
        Ok(())
    }

    async fn start_slave(&self, slave: &SlaveConfig) -> Result<(), SessionError> {
        self.inner.events.connecting();

        let state = ServerState {
            player: Arc::clone(&self.inner.player),
            config: Arc::clone(&self.inner.config),
            tokens: Arc::clone(&self.inner.tokens),
            events: Arc::clone(&self.inner.events),
        };

        match server::serve(&slave.listen.host, slave.listen.port, state).await {
            Ok(handle) => {
                info!("Slave listening on {}", handle.local_addr());
                *self.inner.server.lock().await = Some(handle);

                match slave.master.clone().filter(|_| slave.auto_connect) {
                    // Stays Connecting until the master answers
                    Some(master) => {
                        info!("Watching master at {}", master);
                        self.start_loop("Master watch", MASTER_PROBE_INTERVAL, move |inner| {
                            let master = master.clone();
                            async move { inner.watch_master(&master).await }
                        });
                    }
                    None => self.inner.events.succeeded(),
                }
                Ok(())
            }
            Err(e) => {
                warn!("Cannot start slave: {}", e);
                self.inner.events.failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Stop the poll loop and the control endpoint
    pub async fn stop(&self) {
        self.shutdown().await;
        self.inner.events.disconnected();
        info!("Sync stopped");
    }

    pub async fn restart(&self) -> Result<(), SessionError> {
        info!("Restarting sync");
        self.stop().await;
        self.start().await
    }

    /// Tear everything down without touching the status
    async fn shutdown(&self) {
        self.stop_loop();

        if let Some(handle) = self.inner.server.lock().await.take() {
            handle.shutdown().await;
        }

        // Waits for a tick that is still delivering
        self.inner.detector.lock().await.reset();
    }

    /// Run `pass` now and then every `interval` until stopped.
    ///
    /// Each pass is spawned so a slow one never delays the timer.
    fn start_loop<F, Fut>(&self, name: &'static str, interval: Duration, pass: F)
    where
        F: Fn(Arc<Inner>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop_loop();

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        *self.inner.poll_cancel.lock() = Some(cancel_tx);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            info!("{} started", name);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => break,
                    _ = ticker.tick() => {
                        tokio::spawn(pass(Arc::clone(&inner)));
                    }
                }
            }

            info!("{} stopped", name);
        });
    }

    fn stop_loop(&self) {
        if let Some(tx) = self.inner.poll_cancel.lock().take() {
            let _ = tx.send(());
        }
    }

    /// Restart the session whenever a change needs it.
    ///
    /// Other changes (tokens, feature flags, debug logging) are read on the
    /// next tick and need nothing here.
    pub fn watch_config(&self) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut rx = self.inner.config.subscribe();

        tokio::spawn(async move {
            let mut previous = rx.borrow_and_update().clone();

            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else { break };

                if SyncConfig::restart_required(&previous, &current) {
                    info!("Configuration changed, restarting sync");
                    let session = SyncSession { inner };
                    if let Err(e) = session.restart().await {
                        warn!("Restart after config change failed: {}", e);
                    }
                } else {
                    debug!("Configuration changed, no restart needed");
                }
                previous = current;
            }
        })
    }

    /// Run one sync pass right now.
    ///
    /// Waits for a tick that is still delivering, then reports how this
    /// pass went.
    pub async fn sync_now(&self) -> Result<(), SessionError> {
        if !self.is_polling() {
            return Err(SessionError::NotMaster);
        }

        let mut detector = self.inner.detector.lock().await;
        // Stopped while waiting
        if !self.is_polling() {
            return Err(SessionError::NotMaster);
        }
        self.inner.sync_pass(&mut detector).await
    }

    fn is_polling(&self) -> bool {
        self.inner.config.get().active_role() == RoleKind::Master && self.is_running()
    }

    /// Replace the slave's queue with `ids`
    pub async fn push_queue(&self, ids: Vec<String>) -> Result<(), SessionError> {
        if self.inner.config.get().active_role() != RoleKind::Master {
            return Err(SessionError::NotMaster);
        }

        let change = PlannedSync::Queue(ids);
        let mut detector = self.inner.detector.lock().await;
        match self.inner.deliver(&change).await {
            Ok(()) => {
                detector.mark_sent(&change);
                self.inner.events.succeeded();
                self.inner.events.synced(&change);
                Ok(())
            }
            Err(e) => {
                self.inner.events.failed(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Probe the peer: the slave from a master, the master from a slave
    pub async fn test_connection(&self) -> ConnectionTest {
        let config = self.inner.config.get();
        let role = config.role.kind();

        match role {
            RoleKind::Disabled => ConnectionTest {
                role,
                target: None,
                ok: false,
                message: "Sync is disabled".to_string(),
            },
            RoleKind::Master => {
                let target = config.role.master().map(|m| m.peer.clone());
                match self.inner.peer.health().await {
                    Ok(_) => {
                        self.inner.events.succeeded();
                        ConnectionTest {
                            role,
                            target,
                            ok: true,
                            message: "Slave is reachable".to_string(),
                        }
                    }
                    Err(e) => {
                        self.inner.events.failed(e.to_string());
                        ConnectionTest {
                            role,
                            target,
                            ok: false,
                            message: e.to_string(),
                        }
                    }
                }
            }
            RoleKind::Slave => {
                let Some(master) = config.role.slave().and_then(|s| s.master.clone()) else {
                    return ConnectionTest {
                        role,
                        target: None,
                        ok: false,
                        message: "No master configured".to_string(),
                    };
                };
                let (ok, message) = match self.inner.peer.probe(&master).await {
                    Ok(_) => (true, "Master is reachable".to_string()),
                    Err(e) => (false, e.to_string()),
                };
                ConnectionTest {
                    role,
                    target: Some(master),
                    ok,
                    message,
                }
            }
        }
    }
}

impl Inner {
    /// Send every command of one change, in order
    async fn deliver(&self, change: &PlannedSync) -> Result<(), PeerError> {
        for command in change.commands() {
            self.peer.send(&command).await?;
        }
        Ok(())
    }

    /// Timer-driven poll; skipped while the previous pass still runs
    async fn tick(&self) {
        let Ok(mut detector) = self.detector.try_lock() else {
            debug!("Previous sync still running, skipping tick");
            return;
        };
        // Stopped while this tick was waiting to run
        if self.poll_cancel.lock().is_none() {
            return;
        }

        // Failures are already reported through the events
        let _ = self.sync_pass(&mut detector).await;
    }

    /// Sample the player, plan, deliver. The first failure ends the pass.
    async fn sync_pass(&self, detector: &mut ChangeDetector) -> Result<(), SessionError> {
        let config = self.config.get();
        let Some(master) = config.role.master() else {
            return Err(SessionError::NotMaster);
        };
        let verbose = config.log_debug;

        let current = match self.player.snapshot().await {
            Ok(state) => state,
            Err(e) => {
                warn!("Could not read the local player: {}", e);
                self.events.error(format!("Could not read the local player: {}", e));
                return Err(e.into());
            }
        };

        let planned = detector.plan(&current, master.sync_play_pause, master.sync_queue);
        if planned.is_empty() {
            if self.events.status().current() != ConnectionStatus::Connected {
                match self.peer.health().await {
                    Ok(_) => self.events.succeeded(),
                    Err(e) => {
                        self.events.failed(e.to_string());
                        return Err(e.into());
                    }
                }
            }
            return Ok(());
        }

        for change in planned {
            match self.deliver(&change).await {
                Ok(()) => {
                    detector.mark_sent(&change);
                    sync_log!(verbose, "Synced {}", change.describe());
                    self.events.succeeded();
                    self.events.synced(&change);
                }
                Err(e) => {
                    warn!("Failed to sync {}: {}", change.describe(), e);
                    self.events.failed(e.to_string());
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// One probe of the master's health endpoint
    async fn watch_master(&self, master: &PeerEndpoint) {
        let Ok(_pass) = self.detector.try_lock() else {
            debug!("Previous master probe still running, skipping");
            return;
        };
        if self.poll_cancel.lock().is_none() {
            return;
        }

        match self.peer.probe(master).await {
            Ok(_) => {
                debug!("Master at {} is reachable", master);
                self.events.succeeded();
            }
            Err(e) => {
                warn!("Master at {} is unreachable: {}", master, e);
                self.events.failed(format!("Master unreachable: {}", e));
            }
        }
    }
}
