//! Local player access
//!
//! The master samples its local player every tick and the slave's control
//! endpoint drives its local player. Both go through the [`Player`] trait.

mod client;
mod types;

use axum::async_trait;

pub use client::{PlayerClient, PlayerError};
pub use types::*;

use crate::sync::PlaybackState;

/// Operations on the player running on this machine
#[async_trait]
pub trait Player: Send + Sync {
    /// Current song, paused flag and queue
    async fn snapshot(&self) -> Result<PlaybackState, PlayerError>;

    /// Resume playback
    async fn play(&self) -> Result<(), PlayerError>;

    /// Pause playback
    async fn pause(&self) -> Result<(), PlayerError>;

    /// Toggle between playing and paused
    async fn toggle_play(&self) -> Result<(), PlayerError>;

    /// Start playing a specific video
    async fn play_video(&self, video_id: &str) -> Result<(), PlayerError>;

    /// Remove everything from the queue
    async fn clear_queue(&self) -> Result<(), PlayerError>;

    /// Append a video to the queue
    async fn add_to_queue(&self, video_id: &str) -> Result<(), PlayerError>;
}
