//! Status transitions and callback fan-out

use std::sync::Arc;

use parking_lot::RwLock;

use super::detector::PlannedSync;
use super::status::{ConnectionStatus, StatusTracker};
use crate::peer::PeerCommand;

/// Receives session events (dashboard, tray, tests)
pub trait SyncCallback: Send + Sync {
    fn on_status_changed(&self, status: ConnectionStatus);
    fn on_synced(&self, change: &PlannedSync);
    fn on_command_received(&self, command: &PeerCommand);
    fn on_error(&self, message: String);
}

/// Status tracker plus the registered callback.
///
/// Shared by the poll driver and the control endpoint so both report
/// through the same place.
#[derive(Default)]
pub struct SyncEvents {
    status: StatusTracker,
    callback: RwLock<Option<Arc<dyn SyncCallback>>>,
}

impl SyncEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_callback(&self, callback: Arc<dyn SyncCallback>) {
        *self.callback.write() = Some(callback);
    }

    pub fn status(&self) -> &StatusTracker {
        &self.status
    }

    fn callback(&self) -> Option<Arc<dyn SyncCallback>> {
        self.callback.read().clone()
    }

    fn notify_status(&self, changed: bool) {
        if changed {
            if let Some(cb) = self.callback() {
                cb.on_status_changed(self.status.current());
            }
        }
    }

    pub fn connecting(&self) {
        self.notify_status(self.status.connecting());
    }

    pub fn succeeded(&self) {
        self.notify_status(self.status.succeeded());
    }

    pub fn failed(&self, message: impl Into<String>) {
        let message = message.into();
        let changed = self.status.failed(message.clone());
        self.notify_status(changed);
        self.error(message);
    }

    pub fn disconnected(&self) {
        self.notify_status(self.status.disconnected());
    }

    pub fn synced(&self, change: &PlannedSync) {
        if let Some(cb) = self.callback() {
            cb.on_synced(change);
        }
    }

    pub fn command_received(&self, command: &PeerCommand) {
        if let Some(cb) = self.callback() {
            cb.on_command_received(command);
        }
    }

    /// Report an error without touching the status
    pub fn error(&self, message: String) {
        if let Some(cb) = self.callback() {
            cb.on_error(message);
        }
    }
}

impl std::fmt::Debug for SyncEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEvents")
            .field("status", &self.status.current())
            .finish()
    }
}
