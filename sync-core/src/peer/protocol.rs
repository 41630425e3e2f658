//! Peer control API
//!
//! Paths and bodies shared by the master's client and the slave's
//! control endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::player::VideoRequest;

pub const HEALTH_PATH: &str = "/health";
pub const CONTROL_PANEL_PATH: &str = "/controlPanel";
pub const PLAY_PATH: &str = "/api/v1/play";
pub const PAUSE_PATH: &str = "/api/v1/pause";
pub const QUEUE_CLEAR_PATH: &str = "/api/v1/queue/clear";
pub const QUEUE_ADD_PATH: &str = "/api/v1/queue/add";
pub const AUTH_PATH: &str = "/auth/master-sync";

/// Actions accepted by `POST /controlPanel`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlAction {
    Play,
    Pause,
    TogglePlay,
}

/// Body of `POST /controlPanel`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPanelRequest {
    pub action: ControlAction,
}

/// JSON envelope every control route replies with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn ok(timestamp: u64) -> Self {
        Self {
            success: true,
            timestamp: Some(timestamp),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: None,
            error: Some(error.into()),
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
}

/// Body of `POST /auth/master-sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub name: String,
}

/// Reply of `POST /auth/master-sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
}

/// A single command pushed from master to slave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    /// Switch to a specific video
    PlayVideo(String),
    /// Resume playback
    Play,
    /// Pause playback
    Pause,
    /// Empty the queue
    QueueClear,
    /// Append to the queue
    QueueAdd(String),
}

impl PeerCommand {
    /// Path of the route handling this command
    pub fn path(&self) -> &'static str {
        match self {
            PeerCommand::PlayVideo(_) | PeerCommand::Play => PLAY_PATH,
            PeerCommand::Pause => PAUSE_PATH,
            PeerCommand::QueueClear => QUEUE_CLEAR_PATH,
            PeerCommand::QueueAdd(_) => QUEUE_ADD_PATH,
        }
    }

    /// JSON body, if the route takes one
    pub fn body(&self) -> Option<Value> {
        match self {
            PeerCommand::PlayVideo(id) | PeerCommand::QueueAdd(id) => Some(
                serde_json::to_value(VideoRequest {
                    video_id: id.clone(),
                })
                .unwrap_or(Value::Null),
            ),
            _ => None,
        }
    }
}

impl std::fmt::Display for PeerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerCommand::PlayVideo(id) => write!(f, "play {}", id),
            PeerCommand::Play => write!(f, "play"),
            PeerCommand::Pause => write!(f, "pause"),
            PeerCommand::QueueClear => write!(f, "queue clear"),
            PeerCommand::QueueAdd(id) => write!(f, "queue add {}", id),
        }
    }
}

/// Milliseconds since the UNIX epoch
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
