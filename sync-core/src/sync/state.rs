//! Playback state and the last-sent snapshot

use serde::{Deserialize, Serialize};

/// Order-preserving digest of a queue's video ids.
///
/// Two queues with the same ids in a different order hash differently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueHash(String);

impl QueueHash {
    pub fn of(ids: &[String]) -> Self {
        // A JSON array keeps ids containing separators unambiguous
        QueueHash(serde_json::to_string(ids).unwrap_or_default())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What the local player is doing right now.
///
/// `None` means the player did not report that field; unknown fields never
/// count as a change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Video id of the current song
    pub song_id: Option<String>,
    /// Whether playback is paused
    pub is_paused: Option<bool>,
    /// Video ids of the play queue, in order
    pub queue: Option<Vec<String>>,
}

impl PlaybackState {
    pub fn queue_hash(&self) -> Option<QueueHash> {
        self.queue.as_deref().map(QueueHash::of)
    }
}

/// The values last delivered to the peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentSnapshot {
    pub song_id: Option<String>,
    pub is_paused: Option<bool>,
    pub queue_hash: Option<QueueHash>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_queue_hash_is_order_sensitive() {
        assert_eq!(QueueHash::of(&ids(&["a", "b"])), QueueHash::of(&ids(&["a", "b"])));
        assert_ne!(QueueHash::of(&ids(&["a", "b"])), QueueHash::of(&ids(&["b", "a"])));
    }

    #[test]
    fn test_queue_hash_is_unambiguous() {
        assert_ne!(QueueHash::of(&ids(&["a,b"])), QueueHash::of(&ids(&["a", "b"])));
        assert_eq!(QueueHash::of(&[]).as_str(), "[]");
    }

    #[test]
    fn test_unknown_queue_has_no_hash() {
        let state = PlaybackState::default();
        assert_eq!(state.queue_hash(), None);
    }
}
