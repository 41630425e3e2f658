//! Sync configuration and the config store
//!
//! The role is a tagged variant so an instance can only ever be one of
//! disabled, master or slave.

use std::fs;
use std::path::Path;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Default port of the slave's control endpoint
pub const DEFAULT_SLAVE_PORT: u16 = 26538;

/// Default address the master pushes to
pub const DEFAULT_SLAVE_HOST: &str = "192.168.1.100";

/// Default port of the local player API
pub const DEFAULT_PLAYER_PORT: u16 = 9863;

/// Default polling period of the master
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 2000;

/// Shortest polling period accepted
pub const MIN_SYNC_INTERVAL_MS: u64 = 500;

/// Longest polling period the menu offers
pub const MAX_SYNC_INTERVAL_MS: u64 = 60_000;

/// Configuration errors, reported before any network attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("SLAVE host is required")]
    MissingHost,

    #[error("SLAVE port must be between 1 and 65535")]
    InvalidPort,

    #[error("Authorization token is required")]
    MissingToken,

    #[error("Sync interval must be at least {MIN_SYNC_INTERVAL_MS}ms (got {0}ms)")]
    IntervalTooShort(u64),

    #[error("Invalid IP address or hostname: {0}")]
    InvalidHost(String),

    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// A host/port pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEndpoint {
    pub host: String,
    pub port: u16,
}

impl PeerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL for HTTP requests to this endpoint
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host.trim(), self.port)
    }
}

impl std::fmt::Display for PeerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Settings for the instance that drives playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterConfig {
    /// The slave's control endpoint
    pub peer: PeerEndpoint,
    /// Bearer token presented to the slave
    pub auth_token: Option<String>,
    /// Polling period in milliseconds
    pub sync_interval_ms: u64,
    /// Mirror play/pause toggles
    pub sync_play_pause: bool,
    /// Mirror the play queue
    pub sync_queue: bool,
    /// Request a fresh token from the slave on 401/403
    pub auto_refresh_token: bool,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            peer: PeerEndpoint::new(DEFAULT_SLAVE_HOST, DEFAULT_SLAVE_PORT),
            auth_token: None,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            sync_play_pause: true,
            sync_queue: true,
            auto_refresh_token: false,
        }
    }
}

impl MasterConfig {
    /// The configured token, if it is non-blank
    pub fn token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Check everything a push needs before touching the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if !is_valid_host(&self.peer.host) {
            return Err(ConfigError::InvalidHost(self.peer.host.trim().to_string()));
        }
        if self.peer.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        // Without a token the first request goes out unauthenticated and
        // the refresh flow fetches one
        if self.token().is_none() && !self.auto_refresh_token {
            return Err(ConfigError::MissingToken);
        }
        if self.sync_interval_ms < MIN_SYNC_INTERVAL_MS {
            return Err(ConfigError::IntervalTooShort(self.sync_interval_ms));
        }
        Ok(())
    }
}

/// Settings for the instance that mirrors playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlaveConfig {
    /// Address the control endpoint binds to
    pub listen: PeerEndpoint,
    /// Token accepted from the master
    pub auth_token: Option<String>,
    /// Whether `POST /auth/master-sync` may issue new tokens
    pub allow_token_requests: bool,
    /// The master's endpoint, only used for health probes
    pub master: Option<PeerEndpoint>,
    /// Probe the master every few seconds and report it as the status
    pub auto_connect: bool,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            listen: PeerEndpoint::new("0.0.0.0", DEFAULT_SLAVE_PORT),
            auth_token: None,
            allow_token_requests: false,
            master: None,
            auto_connect: false,
        }
    }
}

/// The role of this instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum SyncRole {
    #[default]
    Disabled,
    Master(MasterConfig),
    Slave(SlaveConfig),
}

/// Role discriminant without its settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Disabled,
    Master,
    Slave,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Disabled => "NONE",
            RoleKind::Master => "MASTER",
            RoleKind::Slave => "SLAVE",
        }
    }
}

impl std::str::FromStr for RoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "disabled" => Ok(RoleKind::Disabled),
            "master" => Ok(RoleKind::Master),
            "slave" => Ok(RoleKind::Slave),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl SyncRole {
    pub fn kind(&self) -> RoleKind {
        match self {
            SyncRole::Disabled => RoleKind::Disabled,
            SyncRole::Master(_) => RoleKind::Master,
            SyncRole::Slave(_) => RoleKind::Slave,
        }
    }

    pub fn master(&self) -> Option<&MasterConfig> {
        match self {
            SyncRole::Master(m) => Some(m),
            _ => None,
        }
    }

    pub fn slave(&self) -> Option<&SlaveConfig> {
        match self {
            SyncRole::Slave(s) => Some(s),
            _ => None,
        }
    }
}

/// The local player's API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerEndpoint {
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
}

impl Default for PlayerEndpoint {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PLAYER_PORT,
            token: None,
        }
    }
}

/// Complete configuration of one instance.
///
/// Serialized flat, with the role settings next to a `role` tag. A file
/// without the tag loads as [`SyncRole::Disabled`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub role: SyncRole,
    pub player: PlayerEndpoint,
    pub log_debug: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            role: SyncRole::Disabled,
            player: PlayerEndpoint::default(),
            log_debug: false,
        }
    }
}

impl<'de> Deserialize<'de> for SyncConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize, Default)]
        #[serde(rename_all = "camelCase", default)]
        struct Common {
            enabled: bool,
            player: PlayerEndpoint,
            log_debug: bool,
        }

        let value = Value::deserialize(deserializer)?;
        let common = Common::deserialize(&value).map_err(de::Error::custom)?;
        let role = match value.get("role") {
            None | Some(Value::Null) => SyncRole::Disabled,
            Some(_) => SyncRole::deserialize(&value).map_err(de::Error::custom)?,
        };

        Ok(SyncConfig {
            enabled: common.enabled,
            role,
            player: common.player,
            log_debug: common.log_debug,
        })
    }
}

impl SyncConfig {
    /// Role that is actually in effect (a disabled config has none)
    pub fn active_role(&self) -> RoleKind {
        if self.enabled {
            self.role.kind()
        } else {
            RoleKind::Disabled
        }
    }

    /// Whether moving from `old` to `new` needs the session torn down.
    ///
    /// Tokens and feature flags are read on every tick, so only the things
    /// that shape the running tasks count.
    pub fn restart_required(old: &SyncConfig, new: &SyncConfig) -> bool {
        if old.active_role() != new.active_role() {
            return true;
        }
        match (&old.role, &new.role) {
            (SyncRole::Master(a), SyncRole::Master(b)) => {
                a.peer != b.peer || a.sync_interval_ms != b.sync_interval_ms
            }
            (SyncRole::Slave(a), SyncRole::Slave(b)) => {
                a.listen != b.listen || a.master != b.master || a.auto_connect != b.auto_connect
            }
            _ => false,
        }
    }
}

/// Accepts dotted IPv4 addresses, `localhost` and DNS-style hostnames
pub fn is_valid_host(host: &str) -> bool {
    let host = host.trim();
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    let labels: Vec<&str> = host.split('.').collect();
    let all_numeric = labels
        .iter()
        .all(|l| !l.is_empty() && l.chars().all(|c| c.is_ascii_digit()));
    if all_numeric {
        return labels.len() == 4 && labels.iter().all(|l| l.len() <= 3);
    }

    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Shared, observable configuration.
///
/// Components never hold a copy of the config; they read it through the
/// store on every use and subscribe for changes.
#[derive(Debug)]
pub struct ConfigStore {
    tx: watch::Sender<SyncConfig>,
}

impl ConfigStore {
    pub fn new(config: SyncConfig) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self { tx }
    }

    /// Snapshot of the current configuration
    pub fn get(&self) -> SyncConfig {
        self.tx.borrow().clone()
    }

    /// Mutate the configuration in place, notifying subscribers on change.
    ///
    /// `f` runs under the store's lock, so concurrent updates never clobber
    /// each other. Returns whether anything changed.
    pub fn update(&self, f: impl FnOnce(&mut SyncConfig)) -> bool {
        self.tx.send_if_modified(|config| {
            let before = config.clone();
            f(config);
            *config != before
        })
    }

    /// Replace the whole configuration
    pub fn replace(&self, config: SyncConfig) -> bool {
        self.update(|c| *c = config)
    }

    /// Receive a notification whenever the configuration changes
    pub fn subscribe(&self) -> watch::Receiver<SyncConfig> {
        self.tx.subscribe()
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: SyncConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        debug!("Loaded config from {}", path.display());
        Ok(Self::new(config))
    }

    /// Load a JSON config file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config at {}, using defaults", path.display());
            Ok(Self::new(SyncConfig::default()))
        }
    }

    /// Write the current configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(&self.get())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
            }
        }
        fs::write(path, text).map_err(|e| ConfigError::Io(e.to_string()))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
