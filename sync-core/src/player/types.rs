//! Types for the local player API

use serde::{Deserialize, Serialize};

/// Currently playing song as reported by `GET /api/v1/song`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongInfo {
    /// Video identifier of the song
    pub video_id: String,

    /// Song title
    #[serde(default)]
    pub title: String,

    /// Artist name
    #[serde(default)]
    pub artist: String,

    /// Whether playback is paused
    #[serde(default)]
    pub is_paused: Option<bool>,

    /// Elapsed time in seconds
    #[serde(default)]
    pub elapsed_seconds: u64,

    /// Song duration in seconds
    #[serde(default)]
    pub song_duration: u64,
}

/// One entry of the play queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    #[serde(default)]
    pub video_id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,
}

/// Response of `GET /api/v1/queue`
#[derive(Debug, Clone, Deserialize)]
pub struct QueueResponse {
    #[serde(default)]
    pub items: Vec<QueueItem>,
}

impl QueueResponse {
    /// Video ids in queue order, skipping entries without one
    pub fn video_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter_map(|item| item.video_id.clone())
            .collect()
    }
}

/// Request body naming a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub video_id: String,
}
