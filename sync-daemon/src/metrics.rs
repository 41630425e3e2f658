//! Activity tracking for the daemon

use chrono::{DateTime, Local};
use pairsync_core::peer::PeerCommand;
use pairsync_core::sync::{ConnectionStatus, PlannedSync, SyncCallback};
use pairsync_core::{RoleKind, SyncConfig, SyncRole};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Maximum number of log entries to keep
const MAX_LOG_ENTRIES: usize = 100;

/// A log entry for the dashboard
#[derive(Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Status,
    Sync,
    Command,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Status => "STATE",
            LogLevel::Sync => "SYNC",
            LogLevel::Command => "CMD",
        }
    }
}

/// Daemon metrics
pub struct Metrics {
    /// Daemon start time
    pub start_time: DateTime<Local>,

    /// Role in effect
    pub role: RoleKind,

    /// Slave address (master) or listen address (slave)
    pub endpoint: Option<String>,

    /// Connection status as last reported
    pub status: ConnectionStatus,

    /// Most recent failure
    pub last_error: Option<String>,

    /// Changes delivered to the slave
    pub syncs_sent: u64,

    /// Commands received from the master
    pub commands_received: u64,

    /// Errors reported since start
    pub error_count: u64,

    /// Time of the last delivered change or received command
    pub last_activity: Option<DateTime<Local>>,

    /// Log entries
    pub logs: VecDeque<LogEntry>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Local::now(),
            role: RoleKind::Disabled,
            endpoint: None,
            status: ConnectionStatus::Disconnected,
            last_error: None,
            syncs_sent: 0,
            commands_received: 0,
            error_count: 0,
            last_activity: None,
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        });
    }

    /// Pick up role and endpoint from the config
    pub fn config_changed(&mut self, config: &SyncConfig) {
        let role = config.active_role();
        let endpoint = match &config.role {
            SyncRole::Master(m) => Some(m.peer.to_string()),
            SyncRole::Slave(s) => Some(s.listen.to_string()),
            SyncRole::Disabled => None,
        };

        if role != self.role {
            self.log(LogLevel::Info, format!("Role: {}", role.as_str()));
        }
        self.role = role;
        self.endpoint = endpoint;
    }

    pub fn status_changed(&mut self, status: ConnectionStatus) {
        self.status = status;
        if status == ConnectionStatus::Connected {
            self.last_error = None;
        }
        self.log(LogLevel::Status, format!("Status: {}", status));
    }

    pub fn synced(&mut self, change: &PlannedSync) {
        self.syncs_sent += 1;
        self.last_activity = Some(Local::now());
        self.log(LogLevel::Sync, format!("Synced {}", change.describe()));
    }

    pub fn command_received(&mut self, command: &PeerCommand) {
        self.commands_received += 1;
        self.last_activity = Some(Local::now());
        self.log(LogLevel::Command, format!("Received {}", command));
    }

    pub fn error(&mut self, message: String) {
        self.error_count += 1;
        self.log(LogLevel::Error, message.clone());
        self.last_error = Some(message);
    }

    /// Get uptime as formatted string
    pub fn uptime(&self) -> String {
        let duration = Local::now().signed_duration_since(self.start_time);
        format_duration(duration.num_seconds())
    }

    /// Time since the last activity, if any
    pub fn idle_for(&self) -> Option<String> {
        self.last_activity
            .map(|t| format_duration(Local::now().signed_duration_since(t).num_seconds()))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn format_duration(secs: i64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    }
}

/// Feeds session events into the shared metrics
pub struct MetricsCallback {
    metrics: Arc<RwLock<Metrics>>,
}

impl MetricsCallback {
    pub fn new(metrics: Arc<RwLock<Metrics>>) -> Self {
        Self { metrics }
    }
}

impl SyncCallback for MetricsCallback {
    fn on_status_changed(&self, status: ConnectionStatus) {
        self.metrics.write().status_changed(status);
    }

    fn on_synced(&self, change: &PlannedSync) {
        self.metrics.write().synced(change);
    }

    fn on_command_received(&self, command: &PeerCommand) {
        self.metrics.write().command_received(command);
    }

    fn on_error(&self, message: String) {
        self.metrics.write().error(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded() {
        let mut m = Metrics::new();
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            m.log(LogLevel::Info, format!("entry {}", i));
        }
        assert_eq!(m.logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(m.logs.front().unwrap().message, "entry 5");
    }

    #[test]
    fn test_callback_counts_activity() {
        let metrics = Arc::new(RwLock::new(Metrics::new()));
        let callback = MetricsCallback::new(metrics.clone());

        callback.on_synced(&PlannedSync::Song("abc".to_string()));
        callback.on_command_received(&PeerCommand::Pause);
        callback.on_error("refused".to_string());
        callback.on_status_changed(ConnectionStatus::Connected);

        let m = metrics.read();
        assert_eq!(m.syncs_sent, 1);
        assert_eq!(m.commands_received, 1);
        assert_eq!(m.error_count, 1);
        assert_eq!(m.status, ConnectionStatus::Connected);
        assert_eq!(m.last_error, None);
        assert!(m.last_activity.is_some());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
    }
}
