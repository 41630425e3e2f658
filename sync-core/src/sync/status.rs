//! Connection status tracking

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;

/// Connection state shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the current status and publishes transitions.
///
/// Every setter returns whether the status actually changed; subscribers are
/// only woken on a change. The status is informational and never feeds back
/// into retry behaviour.
#[derive(Debug)]
pub struct StatusTracker {
    tx: watch::Sender<ConnectionStatus>,
    last_error: RwLock<Option<String>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            tx,
            last_error: RwLock::new(None),
        }
    }

    pub fn current(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    fn set(&self, status: ConnectionStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    /// A role operation is starting (or restarting)
    pub fn connecting(&self) -> bool {
        self.set(ConnectionStatus::Connecting)
    }

    /// A request reached the peer
    pub fn succeeded(&self) -> bool {
        *self.last_error.write() = None;
        self.set(ConnectionStatus::Connected)
    }

    /// A request failed for good
    pub fn failed(&self, message: impl Into<String>) -> bool {
        *self.last_error.write() = Some(message.into());
        self.set(ConnectionStatus::Error)
    }

    /// The role operation stopped
    pub fn disconnected(&self) -> bool {
        self.set(ConnectionStatus::Disconnected)
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_report_changes() {
        let tracker = StatusTracker::new();
        assert_eq!(tracker.current(), ConnectionStatus::Disconnected);

        assert!(tracker.connecting());
        assert!(!tracker.connecting());
        assert!(tracker.failed("refused"));
        assert!(!tracker.failed("refused again"));
        assert_eq!(tracker.last_error().as_deref(), Some("refused again"));

        assert!(tracker.succeeded());
        assert_eq!(tracker.last_error(), None);
        assert!(tracker.connecting());
        assert!(tracker.disconnected());
    }

    #[test]
    fn test_subscribers_see_only_transitions() {
        let tracker = StatusTracker::new();
        let mut rx = tracker.subscribe();

        tracker.disconnected();
        assert!(!rx.has_changed().unwrap());

        tracker.connecting();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Connecting);
    }
}
