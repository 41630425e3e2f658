//! Status menu model
//!
//! Describes the menu the front end renders (tray, dashboard) and applies
//! the user's picks to the config store. Nothing here draws anything.

use crate::config::{
    is_valid_host, ConfigStore, MasterConfig, PeerEndpoint, RoleKind, SlaveConfig, SyncConfig,
    SyncRole, DEFAULT_SLAVE_PORT, MAX_SYNC_INTERVAL_MS, MIN_SYNC_INTERVAL_MS,
};
use crate::sync::ConnectionStatus;

/// Something the user can pick from the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    ToggleEnabled,
    SetRole(RoleKind),
    ToggleSyncPlayPause,
    ToggleSyncQueue,
    ToggleDebugLogging,
    /// Handled by the session, never changes the config
    TestConnection,
    /// Master: the slave's host
    SetPeerHost(String),
    /// Master: the slave's port. Slave: the listen port
    SetPeerPort(u16),
    SetToken(String),
    SetSyncInterval(u64),
    /// Slave: the master's host, creating the endpoint if needed
    SetMasterHost(String),
    /// Slave: the master's port, once a host is set
    SetMasterPort(u16),
    /// Slave: keep probing the master's health endpoint
    ToggleAutoConnect,
}

/// A setting the user types in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuField {
    PeerHost,
    PeerPort,
    Token,
    SyncInterval,
    MasterHost,
    MasterPort,
}

impl MenuField {
    /// The action for what the user typed, or `None` if it does not parse
    pub fn parse(self, input: &str) -> Option<MenuAction> {
        let input = input.trim();
        match self {
            MenuField::PeerHost => {
                is_valid_host(input).then(|| MenuAction::SetPeerHost(input.to_string()))
            }
            MenuField::MasterHost => {
                is_valid_host(input).then(|| MenuAction::SetMasterHost(input.to_string()))
            }
            MenuField::PeerPort => parse_port(input).map(MenuAction::SetPeerPort),
            MenuField::MasterPort => parse_port(input).map(MenuAction::SetMasterPort),
            MenuField::Token => (!input.is_empty()).then(|| MenuAction::SetToken(input.to_string())),
            MenuField::SyncInterval => input
                .parse::<u64>()
                .ok()
                .filter(|ms| (MIN_SYNC_INTERVAL_MS..=MAX_SYNC_INTERVAL_MS).contains(ms))
                .map(MenuAction::SetSyncInterval),
        }
    }
}

fn parse_port(input: &str) -> Option<u16> {
    input.parse::<u16>().ok().filter(|port| *port > 0)
}

/// One rendered row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Informational line, never clickable
    Label(String),
    Checkbox {
        label: &'static str,
        checked: bool,
        enabled: bool,
        action: MenuAction,
    },
    Radio {
        label: &'static str,
        selected: bool,
        action: MenuAction,
    },
    Button {
        label: &'static str,
        action: MenuAction,
    },
    /// Asks the user for a value
    Prompt {
        label: &'static str,
        current: String,
        field: MenuField,
    },
    Separator,
}

impl MenuItem {
    pub fn action(&self) -> Option<&MenuAction> {
        match self {
            MenuItem::Checkbox { action, .. }
            | MenuItem::Radio { action, .. }
            | MenuItem::Button { action, .. } => Some(action),
            MenuItem::Label(_) | MenuItem::Prompt { .. } | MenuItem::Separator => None,
        }
    }

    pub fn field(&self) -> Option<MenuField> {
        match self {
            MenuItem::Prompt { field, .. } => Some(*field),
            _ => None,
        }
    }
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "Disconnected",
        ConnectionStatus::Connecting => "Connecting...",
        ConnectionStatus::Connected => "Connected",
        ConnectionStatus::Error => "Error",
    }
}

fn prompt(label: &'static str, current: impl ToString, field: MenuField) -> MenuItem {
    MenuItem::Prompt {
        label,
        current: current.to_string(),
        field,
    }
}

/// Tokens are never echoed back
fn masked(token: Option<&str>) -> &'static str {
    if token.is_some() {
        "********"
    } else {
        ""
    }
}

fn token_line(has_token: bool) -> MenuItem {
    MenuItem::Label(if has_token {
        "✓ Authorization Token Set".to_string()
    } else {
        "✗ No Token Set".to_string()
    })
}

/// Rows for the current config and status
pub fn build_menu(config: &SyncConfig, status: ConnectionStatus) -> Vec<MenuItem> {
    let master = config.role.master();
    let is_master = master.is_some();

    let mut items = vec![
        MenuItem::Label(format!("Status: {}", status_label(status))),
        MenuItem::Separator,
        MenuItem::Checkbox {
            label: "Enable Sync",
            checked: config.enabled,
            enabled: true,
            action: MenuAction::ToggleEnabled,
        },
    ];

    for (label, kind) in [
        ("None", RoleKind::Disabled),
        ("Master", RoleKind::Master),
        ("Slave", RoleKind::Slave),
    ] {
        items.push(MenuItem::Radio {
            label,
            selected: config.role.kind() == kind,
            action: MenuAction::SetRole(kind),
        });
    }

    items.push(MenuItem::Separator);
    items.push(MenuItem::Checkbox {
        label: "Sync Play/Pause",
        checked: master.map(|m| m.sync_play_pause).unwrap_or(false),
        enabled: is_master,
        action: MenuAction::ToggleSyncPlayPause,
    });
    items.push(MenuItem::Checkbox {
        label: "Sync Queue",
        checked: master.map(|m| m.sync_queue).unwrap_or(false),
        enabled: is_master,
        action: MenuAction::ToggleSyncQueue,
    });
    items.push(MenuItem::Checkbox {
        label: "Debug Logging",
        checked: config.log_debug,
        enabled: true,
        action: MenuAction::ToggleDebugLogging,
    });

    match &config.role {
        SyncRole::Master(m) => {
            items.push(MenuItem::Separator);
            items.push(MenuItem::Label(format!("Slave: {}", m.peer)));
            items.push(token_line(m.token().is_some()));
            items.push(prompt("Configure SLAVE Host", &m.peer.host, MenuField::PeerHost));
            items.push(prompt("Configure SLAVE Port", m.peer.port, MenuField::PeerPort));
            items.push(prompt(
                "Configure Authorization Token",
                masked(m.token()),
                MenuField::Token,
            ));
            items.push(prompt(
                "Configure Sync Interval (ms)",
                m.sync_interval_ms,
                MenuField::SyncInterval,
            ));
        }
        SyncRole::Slave(s) => {
            let token = s.auth_token.as_deref().filter(|t| !t.trim().is_empty());
            let master = s
                .master
                .as_ref()
                .map_or_else(|| "not set".to_string(), |m| m.to_string());

            items.push(MenuItem::Separator);
            items.push(MenuItem::Label(format!("Listening: {}", s.listen)));
            items.push(token_line(token.is_some()));
            items.push(prompt("Configure Listen Port", s.listen.port, MenuField::PeerPort));
            items.push(prompt("Configure Authorization Token", masked(token), MenuField::Token));
            items.push(MenuItem::Label(format!("Master: {}", master)));
            items.push(prompt(
                "Configure MASTER Host",
                s.master.as_ref().map_or("", |m| m.host.as_str()),
                MenuField::MasterHost,
            ));
            items.push(prompt(
                "Configure MASTER Port",
                s.master.as_ref().map_or(String::new(), |m| m.port.to_string()),
                MenuField::MasterPort,
            ));
            items.push(MenuItem::Checkbox {
                label: "Watch Master",
                checked: s.auto_connect,
                enabled: s.master.is_some(),
                action: MenuAction::ToggleAutoConnect,
            });
        }
        SyncRole::Disabled => {}
    }

    if config.active_role() != RoleKind::Disabled {
        items.push(MenuItem::Button {
            label: "Test Connection",
            action: MenuAction::TestConnection,
        });
    }

    items
}

/// Applies menu picks, remembering the settings of roles switched away from.
///
/// The remembered settings live only as long as this value.
#[derive(Debug, Default)]
pub struct Menu {
    saved_master: Option<MasterConfig>,
    saved_slave: Option<SlaveConfig>,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `action`; returns whether the config changed
    pub fn apply(&mut self, store: &ConfigStore, action: MenuAction) -> bool {
        store.update(|config| self.apply_to(config, action))
    }

    fn apply_to(&mut self, config: &mut SyncConfig, action: MenuAction) {
        match action {
            MenuAction::ToggleEnabled => config.enabled = !config.enabled,
            MenuAction::SetRole(kind) => self.switch_role(config, kind),
            MenuAction::ToggleSyncPlayPause => {
                if let SyncRole::Master(m) = &mut config.role {
                    m.sync_play_pause = !m.sync_play_pause;
                }
            }
            MenuAction::ToggleSyncQueue => {
                if let SyncRole::Master(m) = &mut config.role {
                    m.sync_queue = !m.sync_queue;
                }
            }
            MenuAction::ToggleDebugLogging => config.log_debug = !config.log_debug,
            MenuAction::TestConnection => {}
            MenuAction::SetPeerHost(host) => {
                let host = host.trim();
                if let SyncRole::Master(m) = &mut config.role {
                    if is_valid_host(host) {
                        m.peer.host = host.to_string();
                    }
                }
            }
            MenuAction::SetPeerPort(port) if port > 0 => match &mut config.role {
                SyncRole::Master(m) => m.peer.port = port,
                SyncRole::Slave(s) => s.listen.port = port,
                SyncRole::Disabled => {}
            },
            MenuAction::SetPeerPort(_) => {}
            MenuAction::SetToken(token) => {
                let token = token.trim();
                if !token.is_empty() {
                    match &mut config.role {
                        SyncRole::Master(m) => m.auth_token = Some(token.to_string()),
                        SyncRole::Slave(s) => s.auth_token = Some(token.to_string()),
                        SyncRole::Disabled => {}
                    }
                }
            }
            MenuAction::SetSyncInterval(ms) => {
                if let SyncRole::Master(m) = &mut config.role {
                    if (MIN_SYNC_INTERVAL_MS..=MAX_SYNC_INTERVAL_MS).contains(&ms) {
                        m.sync_interval_ms = ms;
                    }
                }
            }
            MenuAction::SetMasterHost(host) => {
                let host = host.trim();
                if let SyncRole::Slave(s) = &mut config.role {
                    if is_valid_host(host) {
                        s.master
                            .get_or_insert_with(|| PeerEndpoint::new(host, DEFAULT_SLAVE_PORT))
                            .host = host.to_string();
                    }
                }
            }
            MenuAction::SetMasterPort(port) if port > 0 => {
                if let SyncRole::Slave(SlaveConfig {
                    master: Some(master),
                    ..
                }) = &mut config.role
                {
                    master.port = port;
                }
            }
            MenuAction::SetMasterPort(_) => {}
            MenuAction::ToggleAutoConnect => {
                if let SyncRole::Slave(s) = &mut config.role {
                    s.auto_connect = !s.auto_connect;
                }
            }
        }
    }

    fn switch_role(&mut self, config: &mut SyncConfig, kind: RoleKind) {
        if config.role.kind() == kind {
            return;
        }

        let previous = std::mem::take(&mut config.role);
        match previous {
            SyncRole::Master(m) => self.saved_master = Some(m),
            SyncRole::Slave(s) => self.saved_slave = Some(s),
            SyncRole::Disabled => {}
        }

        config.role = match kind {
            RoleKind::Disabled => SyncRole::Disabled,
            RoleKind::Master => SyncRole::Master(self.saved_master.take().unwrap_or_default()),
            RoleKind::Slave => SyncRole::Slave(self.saved_slave.take().unwrap_or_default()),
        };
    }
}

/// Apply a single action without remembering anything across calls
pub fn apply_action(store: &ConfigStore, action: MenuAction) -> bool {
    Menu::new().apply(store, action)
}
