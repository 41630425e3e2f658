//! State-change detection
//!
//! Compares the player's current state with what was last delivered and
//! decides which commands the peer needs. Nothing here does I/O.

use super::state::{PlaybackState, QueueHash, SentSnapshot};
use crate::peer::PeerCommand;

/// One field that changed and must be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedSync {
    /// Another song is playing
    Song(String),
    /// Playback was paused (`true`) or resumed (`false`)
    PlayPause(bool),
    /// The queue changed; it is re-sent in full
    Queue(Vec<String>),
}

impl PlannedSync {
    /// Commands that deliver this change, in order
    pub fn commands(&self) -> Vec<PeerCommand> {
        match self {
            PlannedSync::Song(id) => vec![PeerCommand::PlayVideo(id.clone())],
            PlannedSync::PlayPause(true) => vec![PeerCommand::Pause],
            PlannedSync::PlayPause(false) => vec![PeerCommand::Play],
            PlannedSync::Queue(ids) => std::iter::once(PeerCommand::QueueClear)
                .chain(ids.iter().cloned().map(PeerCommand::QueueAdd))
                .collect(),
        }
    }

    /// Short label for logs and the dashboard
    pub fn describe(&self) -> String {
        match self {
            PlannedSync::Song(id) => format!("song {}", id),
            PlannedSync::PlayPause(true) => "paused".to_string(),
            PlannedSync::PlayPause(false) => "playing".to_string(),
            PlannedSync::Queue(ids) => format!("queue ({} items)", ids.len()),
        }
    }
}

/// Tracks the last delivered snapshot
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: SentSnapshot,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_sent(&self) -> &SentSnapshot {
        &self.last
    }

    /// Changes to deliver: song first, then play/pause, then queue
    pub fn plan(
        &self,
        current: &PlaybackState,
        sync_play_pause: bool,
        sync_queue: bool,
    ) -> Vec<PlannedSync> {
        let mut planned = Vec::new();

        if let Some(song_id) = &current.song_id {
            if self.last.song_id.as_ref() != Some(song_id) {
                planned.push(PlannedSync::Song(song_id.clone()));
            }
        }

        if sync_play_pause {
            if let Some(paused) = current.is_paused {
                if self.last.is_paused != Some(paused) {
                    planned.push(PlannedSync::PlayPause(paused));
                }
            }
        }

        if sync_queue {
            if let (Some(queue), Some(hash)) = (&current.queue, current.queue_hash()) {
                if self.last.queue_hash.as_ref() != Some(&hash) {
                    planned.push(PlannedSync::Queue(queue.clone()));
                }
            }
        }

        planned
    }

    /// Record a change as delivered. Only call after every command of the
    /// change succeeded, so a failed send is planned again next tick.
    pub fn mark_sent(&mut self, change: &PlannedSync) {
        match change {
            PlannedSync::Song(id) => self.last.song_id = Some(id.clone()),
            PlannedSync::PlayPause(paused) => self.last.is_paused = Some(*paused),
            PlannedSync::Queue(ids) => self.last.queue_hash = Some(QueueHash::of(ids)),
        }
    }

    /// Forget everything delivered so far
    pub fn reset(&mut self) {
        self.last = SentSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(song: &str, paused: bool, queue: &[&str]) -> PlaybackState {
        PlaybackState {
            song_id: Some(song.to_string()),
            is_paused: Some(paused),
            queue: Some(queue.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn deliver_all(detector: &mut ChangeDetector, planned: &[PlannedSync]) {
        for change in planned {
            detector.mark_sent(change);
        }
    }

    #[test]
    fn test_first_snapshot_plans_everything() {
        let detector = ChangeDetector::new();
        let planned = detector.plan(&state("A", false, &["a"]), true, true);
        assert_eq!(
            planned,
            vec![
                PlannedSync::Song("A".to_string()),
                PlannedSync::PlayPause(false),
                PlannedSync::Queue(vec!["a".to_string()]),
            ]
        );
    }

    #[test]
    fn test_identical_snapshot_plans_nothing() {
        let mut detector = ChangeDetector::new();
        let current = state("A", false, &["a", "b"]);

        let planned = detector.plan(&current, true, true);
        deliver_all(&mut detector, &planned);

        assert!(detector.plan(&current, true, true).is_empty());
    }

    #[test]
    fn test_undelivered_change_is_planned_again() {
        let mut detector = ChangeDetector::new();
        let current = state("A", true, &[]);

        let planned = detector.plan(&current, true, true);
        // Only the song made it through
        detector.mark_sent(&planned[0]);

        assert_eq!(
            detector.plan(&current, true, true),
            vec![PlannedSync::PlayPause(true), PlannedSync::Queue(vec![])]
        );
    }

    #[test]
    fn test_reordered_queue_is_full_resend() {
        let mut detector = ChangeDetector::new();
        let before = state("A", false, &["a", "b"]);
        let planned = detector.plan(&before, true, true);
        deliver_all(&mut detector, &planned);

        let after = state("A", false, &["b", "a"]);
        let planned = detector.plan(&after, true, true);
        assert_eq!(planned.len(), 1);
        assert_eq!(
            planned[0].commands(),
            vec![
                PeerCommand::QueueClear,
                PeerCommand::QueueAdd("b".to_string()),
                PeerCommand::QueueAdd("a".to_string()),
            ]
        );
    }

    #[test]
    fn test_feature_flags_suppress_fields() {
        let detector = ChangeDetector::new();
        let planned = detector.plan(&state("A", true, &["a"]), false, false);
        assert_eq!(planned, vec![PlannedSync::Song("A".to_string())]);
    }

    #[test]
    fn test_unknown_fields_never_trigger() {
        let detector = ChangeDetector::new();
        assert!(detector
            .plan(&PlaybackState::default(), true, true)
            .is_empty());
    }

    #[test]
    fn test_pause_toggle_commands() {
        assert_eq!(PlannedSync::PlayPause(true).commands(), vec![PeerCommand::Pause]);
        assert_eq!(PlannedSync::PlayPause(false).commands(), vec![PeerCommand::Play]);
    }

    #[test]
    fn test_reset_forgets_snapshot() {
        let mut detector = ChangeDetector::new();
        detector.mark_sent(&PlannedSync::Song("A".to_string()));
        detector.reset();
        assert_eq!(detector.last_sent(), &SentSnapshot::default());
    }
}
