//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{MasterConfig, PeerEndpoint, SyncConfig, SyncRole};
use crate::peer::{PeerCommand, PeerRequest, PeerResponse, Transport, TransportError};
use crate::player::{Player, PlayerError};
use crate::sync::{ConnectionStatus, PlannedSync, PlaybackState, SyncCallback};

/// Enabled master pointing at 192.168.1.100:26538 with token "secret"
pub fn master_config() -> SyncConfig {
    SyncConfig {
        enabled: true,
        role: SyncRole::Master(MasterConfig {
            peer: PeerEndpoint::new("192.168.1.100", 26538),
            auth_token: Some("secret".to_string()),
            ..MasterConfig::default()
        }),
        ..SyncConfig::default()
    }
}

/// Scripted transport; answers `200 {"success":true}` once the script runs out
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<PeerResponse, TransportError>>>,
    fail_all: Mutex<Option<TransportError>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<(Instant, PeerRequest)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.script.lock().push_back(Ok(PeerResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    /// Fail every request that is not scripted
    pub fn fail_all(&self, error: TransportError) {
        *self.fail_all.lock() = Some(error);
    }

    /// Take this long to answer every request
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.requests.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn requests(&self) -> Vec<PeerRequest> {
        self.requests.lock().iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: PeerRequest) -> Result<PeerResponse, TransportError> {
        self.requests.lock().push((Instant::now(), request));

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        if let Some(error) = self.fail_all.lock().clone() {
            return Err(error);
        }
        Ok(PeerResponse {
            status: 200,
            body: r#"{"success":true}"#.to_string(),
        })
    }
}

/// A command the mock player received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCall {
    Play,
    Pause,
    TogglePlay,
    PlayVideo(String),
    ClearQueue,
    AddToQueue(String),
}

/// In-memory player
#[derive(Default)]
pub struct MockPlayer {
    state: Mutex<PlaybackState>,
    calls: Mutex<Vec<PlayerCall>>,
    snapshots: AtomicUsize,
    fail: AtomicBool,
}

impl MockPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, state: PlaybackState) {
        *self.state.lock() = state;
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().clone()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    /// Make every command fail as if the player were not running
    pub fn fail_commands(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: PlayerCall) -> Result<(), PlayerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlayerError::NotReachable);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl Player for MockPlayer {
    async fn snapshot(&self) -> Result<PlaybackState, PlayerError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().clone())
    }

    async fn play(&self) -> Result<(), PlayerError> {
        self.record(PlayerCall::Play)
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.record(PlayerCall::Pause)
    }

    async fn toggle_play(&self) -> Result<(), PlayerError> {
        self.record(PlayerCall::TogglePlay)
    }

    async fn play_video(&self, video_id: &str) -> Result<(), PlayerError> {
        self.record(PlayerCall::PlayVideo(video_id.to_string()))
    }

    async fn clear_queue(&self) -> Result<(), PlayerError> {
        self.record(PlayerCall::ClearQueue)
    }

    async fn add_to_queue(&self, video_id: &str) -> Result<(), PlayerError> {
        self.record(PlayerCall::AddToQueue(video_id.to_string()))
    }
}

/// Callback that remembers everything it was told
#[derive(Default)]
pub struct RecordingCallback {
    statuses: Mutex<Vec<ConnectionStatus>>,
    synced: Mutex<Vec<PlannedSync>>,
    commands: Mutex<Vec<PeerCommand>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingCallback {
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.lock().clone()
    }

    pub fn synced(&self) -> Vec<PlannedSync> {
        self.synced.lock().clone()
    }

    pub fn commands(&self) -> Vec<PeerCommand> {
        self.commands.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl SyncCallback for RecordingCallback {
    fn on_status_changed(&self, status: ConnectionStatus) {
        self.statuses.lock().push(status);
    }

    fn on_synced(&self, change: &PlannedSync) {
        self.synced.lock().push(change.clone());
    }

    fn on_command_received(&self, command: &PeerCommand) {
        self.commands.lock().push(command.clone());
    }

    fn on_error(&self, message: String) {
        self.errors.lock().push(message);
    }
}
