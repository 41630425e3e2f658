//! Terminal dashboard for the sync daemon

use crate::metrics::{LogLevel, Metrics};
use crate::runner;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pairsync_core::menu::{build_menu, Menu, MenuAction, MenuField, MenuItem};
use pairsync_core::{ConfigStore, ConnectionStatus, RoleKind, SyncConfig, SyncSession};
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame, Terminal,
};
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Dashboard state for scrolling etc.
struct DashboardState {
    /// Log scroll position (0 = most recent at bottom)
    log_scroll: usize,
    /// Whether auto-scroll is enabled (follows new logs)
    auto_scroll: bool,
    /// Log length at the last draw
    seen_logs: usize,
    /// Setting being typed in, if any
    prompt: Option<PromptInput>,
}

/// A menu setting the user is typing
#[derive(Debug, Clone, PartialEq)]
struct PromptInput {
    field: MenuField,
    label: &'static str,
    current: String,
    input: String,
}

/// Key bound to a menu action
fn key_for(action: &MenuAction) -> Option<char> {
    match action {
        MenuAction::ToggleEnabled => Some('e'),
        MenuAction::SetRole(RoleKind::Disabled) => Some('n'),
        MenuAction::SetRole(RoleKind::Master) => Some('m'),
        MenuAction::SetRole(RoleKind::Slave) => Some('s'),
        MenuAction::ToggleSyncPlayPause => Some('p'),
        MenuAction::ToggleSyncQueue => Some('u'),
        MenuAction::ToggleDebugLogging => Some('d'),
        MenuAction::TestConnection => Some('t'),
        MenuAction::ToggleAutoConnect => Some('w'),
        _ => None,
    }
}

/// Key that opens the prompt for a setting
fn key_for_field(field: MenuField) -> char {
    match field {
        MenuField::PeerHost => 'h',
        MenuField::PeerPort => 'o',
        MenuField::Token => 'k',
        MenuField::SyncInterval => 'i',
        MenuField::MasterHost => 'g',
        MenuField::MasterPort => 'j',
    }
}

/// Prompt for the setting bound to `key`, if the menu currently offers it
fn open_prompt(items: &[MenuItem], key: char) -> Option<PromptInput> {
    items.iter().find_map(|item| match item {
        MenuItem::Prompt {
            label,
            current,
            field,
        } if key_for_field(*field) == key => Some(PromptInput {
            field: *field,
            label: *label,
            current: current.clone(),
            input: String::new(),
        }),
        _ => None,
    })
}

/// Menu action bound to a key
fn action_for(key: char) -> Option<MenuAction> {
    [
        MenuAction::ToggleEnabled,
        MenuAction::SetRole(RoleKind::Disabled),
        MenuAction::SetRole(RoleKind::Master),
        MenuAction::SetRole(RoleKind::Slave),
        MenuAction::ToggleSyncPlayPause,
        MenuAction::ToggleSyncQueue,
        MenuAction::ToggleDebugLogging,
        MenuAction::TestConnection,
        MenuAction::ToggleAutoConnect,
    ]
    .into_iter()
    .find(|action| key_for(action) == Some(key))
}

/// Run the dashboard
pub async fn run(
    config: Arc<ConfigStore>,
    config_path: PathBuf,
    metrics: Arc<RwLock<Metrics>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = runner::start_session(Arc::clone(&config), config_path, Arc::clone(&metrics)).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut menu = Menu::new();
    let mut state = DashboardState {
        log_scroll: 0,
        auto_scroll: true,
        seen_logs: 0,
        prompt: None,
    };

    // Main loop
    let tick_rate = Duration::from_millis(100);
    let mut should_quit = false;

    while !should_quit {
        // New log entries came in, scroll to bottom if auto-scroll enabled
        let log_count = metrics.read().logs.len();
        if log_count != state.seen_logs {
            state.seen_logs = log_count;
            if state.auto_scroll {
                state.log_scroll = 0;
            }
        }

        // Draw
        let current = config.get();
        terminal.draw(|f| draw(f, &metrics, &current, &state))?;

        // Handle input
        if !event::poll(tick_rate)? {
            // Let background tasks run between polls
            tokio::task::yield_now().await;
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if let Some(mut prompt) = state.prompt.take() {
            match key.code {
                KeyCode::Enter => submit_prompt(&prompt, &mut menu, &config, &metrics),
                KeyCode::Esc => {}
                KeyCode::Char(_) if key.modifiers.contains(event::KeyModifiers::CONTROL) => {}
                KeyCode::Char(c) => {
                    prompt.input.push(c);
                    state.prompt = Some(prompt);
                }
                KeyCode::Backspace => {
                    prompt.input.pop();
                    state.prompt = Some(prompt);
                }
                _ => state.prompt = Some(prompt),
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                should_quit = true
            }
            KeyCode::Char('r') => spawn_sync_now(&session, &metrics),
            KeyCode::Char(c) => {
                if let Some(action) = action_for(c) {
                    if action == MenuAction::TestConnection {
                        spawn_connection_test(&session, &metrics);
                    } else if menu.apply(&config, action) {
                        metrics.write().log(LogLevel::Info, "Settings updated");
                    }
                } else {
                    let status = metrics.read().status;
                    state.prompt = open_prompt(&build_menu(&current, status), c);
                }
            }
            // Scroll up (older logs)
            KeyCode::Up => {
                if log_count > 0 {
                    state.log_scroll = (state.log_scroll + 1).min(log_count.saturating_sub(1));
                    state.auto_scroll = false;
                }
            }
            // Scroll down (newer logs)
            KeyCode::Down => {
                if state.log_scroll > 0 {
                    state.log_scroll -= 1;
                }
                if state.log_scroll == 0 {
                    state.auto_scroll = true;
                }
            }
            KeyCode::PageUp => {
                if log_count > 0 {
                    state.log_scroll = (state.log_scroll + 10).min(log_count.saturating_sub(1));
                    state.auto_scroll = false;
                }
            }
            KeyCode::PageDown => {
                state.log_scroll = state.log_scroll.saturating_sub(10);
                if state.log_scroll == 0 {
                    state.auto_scroll = true;
                }
            }
            KeyCode::Home => {
                if log_count > 0 {
                    state.log_scroll = log_count.saturating_sub(1);
                    state.auto_scroll = false;
                }
            }
            KeyCode::End => {
                state.log_scroll = 0;
                state.auto_scroll = true;
            }
            _ => {}
        }
    }

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    session.stop().await;

    Ok(())
}

fn submit_prompt(
    prompt: &PromptInput,
    menu: &mut Menu,
    config: &ConfigStore,
    metrics: &Arc<RwLock<Metrics>>,
) {
    match prompt.field.parse(&prompt.input) {
        Some(action) => {
            if menu.apply(config, action) {
                metrics.write().log(LogLevel::Info, format!("{}: updated", prompt.label));
            }
        }
        None => metrics.write().log(
            LogLevel::Warning,
            format!("{}: invalid value '{}'", prompt.label, prompt.input.trim()),
        ),
    }
}

fn spawn_connection_test(session: &SyncSession, metrics: &Arc<RwLock<Metrics>>) {
    let session = session.clone();
    let metrics = Arc::clone(metrics);
    metrics.write().log(LogLevel::Info, "Testing connection...");

    tokio::spawn(async move {
        let result = session.test_connection().await;
        let target = result
            .target
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        let level = if result.ok { LogLevel::Info } else { LogLevel::Warning };
        metrics
            .write()
            .log(level, format!("Connection test ({}): {}", target, result.message));
    });
}

fn spawn_sync_now(session: &SyncSession, metrics: &Arc<RwLock<Metrics>>) {
    let session = session.clone();
    let metrics = Arc::clone(metrics);

    tokio::spawn(async move {
        if let Err(e) = session.sync_now().await {
            metrics.write().log(LogLevel::Warning, format!("Sync now: {}", e));
        }
    });
}

/// Draw the dashboard
fn draw(f: &mut Frame, metrics: &Arc<RwLock<Metrics>>, config: &SyncConfig, state: &DashboardState) {
    let m = metrics.read();
    let menu = build_menu(config, m.status);

    // Main layout
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),                       // Header
            Constraint::Length(menu.len() as u16 + 2),   // Menu and stats
            Constraint::Min(8),                          // Logs
            Constraint::Length(1),                       // Footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], &m);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);
    draw_menu(f, middle[0], &menu);
    draw_stats(f, middle[1], &m);

    draw_logs(f, chunks[2], &m, state);
    draw_footer(f, chunks[3], state);
}

fn status_style(status: ConnectionStatus) -> Style {
    match status {
        ConnectionStatus::Disconnected => Style::default().fg(Color::DarkGray),
        ConnectionStatus::Connecting => Style::default().fg(Color::Yellow),
        ConnectionStatus::Connected => Style::default().fg(Color::Green),
        ConnectionStatus::Error => Style::default().fg(Color::Red),
    }
}

fn draw_header(f: &mut Frame, area: Rect, m: &Metrics) {
    let title = vec![Line::from(vec![
        Span::styled("Pairsync", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  Role: "),
        Span::styled(m.role.as_str(), Style::default().fg(Color::Magenta)),
        Span::raw("  │  Status: "),
        Span::styled(m.status.as_str().to_uppercase(), status_style(m.status)),
        Span::raw("  │  Uptime: "),
        Span::styled(m.uptime(), Style::default().fg(Color::Cyan)),
    ])];

    let header = Paragraph::new(title)
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "));

    f.render_widget(header, area);
}

fn draw_menu(f: &mut Frame, area: Rect, items: &[MenuItem]) {
    let dim = Style::default().fg(Color::DarkGray);
    let key_hint = |action: &MenuAction| {
        key_for(action)
            .map(|k| format!(" {} ", k.to_ascii_uppercase()))
            .unwrap_or_default()
    };

    let lines: Vec<Line> = items
        .iter()
        .map(|item| match item {
            MenuItem::Label(text) => Line::from(Span::styled(text.clone(), dim)),
            MenuItem::Separator => Line::from(Span::styled("─".repeat(24), dim)),
            MenuItem::Checkbox {
                label,
                checked,
                enabled,
                action,
            } => {
                let mark = if *checked { "[x]" } else { "[ ]" };
                let style = if *enabled { Style::default() } else { dim };
                Line::from(vec![
                    Span::styled(key_hint(action), Style::default().fg(Color::Black).bg(Color::White)),
                    Span::styled(format!(" {} {}", mark, label), style),
                ])
            }
            MenuItem::Radio {
                label,
                selected,
                action,
            } => {
                let mark = if *selected { "(•)" } else { "( )" };
                Line::from(vec![
                    Span::styled(key_hint(action), Style::default().fg(Color::Black).bg(Color::White)),
                    Span::raw(format!(" {} {}", mark, label)),
                ])
            }
            MenuItem::Button { label, action } => Line::from(vec![
                Span::styled(key_hint(action), Style::default().fg(Color::Black).bg(Color::White)),
                Span::styled(format!(" {}", label), Style::default().fg(Color::Cyan)),
            ]),
            MenuItem::Prompt {
                label,
                current,
                field,
            } => Line::from(vec![
                Span::styled(
                    format!(" {} ", key_for_field(*field).to_ascii_uppercase()),
                    Style::default().fg(Color::Black).bg(Color::White),
                ),
                Span::raw(format!(" {}: ", label)),
                Span::styled(current.clone(), Style::default().fg(Color::Cyan)),
            ]),
        })
        .collect();

    let block = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Sync "));
    f.render_widget(block, area);
}

fn draw_stats(f: &mut Frame, area: Rect, m: &Metrics) {
    let endpoint = m.endpoint.clone().unwrap_or_else(|| "-".to_string());
    let last_activity = m
        .idle_for()
        .map(|d| format!("{} ago", d))
        .unwrap_or_else(|| "never".to_string());
    let last_error = m.last_error.clone().unwrap_or_else(|| "none".to_string());

    let info = vec![
        Line::from(vec![
            Span::raw("Peer: "),
            Span::styled(endpoint, Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("Synced: "),
            Span::styled(
                m.syncs_sent.to_string(),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::raw("Received: "),
            Span::styled(m.commands_received.to_string(), Style::default().fg(Color::Magenta)),
        ]),
        Line::from(vec![
            Span::raw("Errors: "),
            Span::styled(m.error_count.to_string(), Style::default().fg(Color::Red)),
        ]),
        Line::from(vec![
            Span::raw("Last activity: "),
            Span::styled(last_activity, Style::default().fg(Color::White)),
        ]),
        Line::from(vec![
            Span::raw("Last error: "),
            Span::styled(last_error, Style::default().fg(Color::Yellow)),
        ]),
    ];

    let block = Paragraph::new(info)
        .block(Block::default().borders(Borders::ALL).title(" Activity "));
    f.render_widget(block, area);
}

fn draw_logs(f: &mut Frame, area: Rect, m: &Metrics, state: &DashboardState) {
    let visible_height = area.height.saturating_sub(2) as usize;
    let total_logs = m.logs.len();

    let log_items: Vec<ListItem> = m.logs
        .iter()
        .rev()
        .skip(state.log_scroll)
        .take(visible_height)
        .map(|entry| {
            let level_style = match entry.level {
                LogLevel::Info => Style::default().fg(Color::Blue),
                LogLevel::Warning => Style::default().fg(Color::Yellow),
                LogLevel::Error => Style::default().fg(Color::Red),
                LogLevel::Status => Style::default().fg(Color::Cyan),
                LogLevel::Sync => Style::default().fg(Color::Green),
                LogLevel::Command => Style::default().fg(Color::Magenta),
            };

            let time = entry.timestamp.format("%H:%M:%S").to_string();

            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("[{}] ", entry.level.as_str()), level_style),
                Span::raw(&entry.message),
            ]))
        })
        .collect();

    let scroll_indicator = if state.auto_scroll {
        " [AUTO] ".to_string()
    } else if total_logs > 0 {
        format!(" [{}/{}] ", total_logs - state.log_scroll, total_logs)
    } else {
        String::new()
    };

    let logs = List::new(log_items)
        .block(Block::default().borders(Borders::ALL).title(format!(" Activity Log{}", scroll_indicator)));

    f.render_widget(logs, area);

    if total_logs > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("↑"))
            .end_symbol(Some("↓"));

        let mut scrollbar_state = ScrollbarState::new(total_logs)
            .position(total_logs.saturating_sub(state.log_scroll + visible_height));

        f.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin { vertical: 1, horizontal: 0 }),
            &mut scrollbar_state,
        );
    }
}

fn draw_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let key = Style::default().fg(Color::Black).bg(Color::White);

    if let Some(prompt) = &state.prompt {
        let footer = Paragraph::new(Line::from(vec![
            Span::raw(format!(" {} (now {}): ", prompt.label, prompt.current)),
            Span::styled(format!("{}_", prompt.input), Style::default().fg(Color::Yellow)),
            Span::raw("  "),
            Span::styled(" Enter ", key),
            Span::raw(" Save  "),
            Span::styled(" Esc ", key),
            Span::raw(" Cancel"),
        ]));
        f.render_widget(footer, area);
        return;
    }

    let auto_text = if state.auto_scroll { "ON " } else { "OFF" };
    let auto_color = if state.auto_scroll { Color::Green } else { Color::Yellow };

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" Q ", key),
        Span::raw(" Quit  "),
        Span::styled(" R ", key),
        Span::raw(" Sync now  "),
        Span::styled(" ↑↓ ", key),
        Span::raw(" Scroll  "),
        Span::styled(" PgUp/Dn ", key),
        Span::raw(" Page  "),
        Span::raw(" Auto-scroll: "),
        Span::styled(auto_text, Style::default().fg(auto_color)),
    ]));

    f.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip() {
        for key in ['e', 'n', 'm', 's', 'p', 'u', 'd', 't', 'w'] {
            let action = action_for(key).unwrap();
            assert_eq!(key_for(&action), Some(key));
        }
        assert_eq!(action_for('q'), None);
        assert_eq!(action_for('r'), None);
    }

    #[test]
    fn test_every_menu_action_has_a_key() {
        let items = build_menu(&SyncConfig::default(), ConnectionStatus::Disconnected);
        for item in &items {
            if let Some(action) = item.action() {
                assert!(key_for(action).is_some(), "no key for {:?}", action);
            }
        }
    }

    #[test]
    fn test_setting_keys_do_not_clash_with_actions() {
        for field in [
            MenuField::PeerHost,
            MenuField::PeerPort,
            MenuField::Token,
            MenuField::SyncInterval,
            MenuField::MasterHost,
            MenuField::MasterPort,
        ] {
            let key = key_for_field(field);
            assert_eq!(action_for(key), None, "{} is taken", key);
            assert!(!['q', 'r'].contains(&key));
        }
    }

    #[test]
    fn test_prompts_follow_the_role() {
        let mut config = SyncConfig {
            enabled: true,
            ..SyncConfig::default()
        };
        let store = ConfigStore::new(config.clone());
        Menu::new().apply(&store, MenuAction::SetRole(RoleKind::Master));
        config = store.get();

        let items = build_menu(&config, ConnectionStatus::Connected);
        let prompt = open_prompt(&items, 'i').unwrap();
        assert_eq!(prompt.field, MenuField::SyncInterval);
        assert_eq!(prompt.current, "2000");
        assert!(prompt.input.is_empty());
        // Master endpoint settings only exist on a slave
        assert_eq!(open_prompt(&items, 'g'), None);

        Menu::new().apply(&store, MenuAction::SetRole(RoleKind::Slave));
        let items = build_menu(&store.get(), ConnectionStatus::Connected);
        assert_eq!(open_prompt(&items, 'g').map(|p| p.field), Some(MenuField::MasterHost));
        assert_eq!(open_prompt(&items, 'i'), None);
    }

    #[test]
    fn test_submitted_prompt_updates_config() {
        let store = ConfigStore::new(SyncConfig::default());
        let mut menu = Menu::new();
        menu.apply(&store, MenuAction::SetRole(RoleKind::Master));
        let metrics = Arc::new(RwLock::new(Metrics::new()));

        let items = build_menu(&store.get(), ConnectionStatus::Disconnected);
        let mut prompt = open_prompt(&items, 'h').unwrap();
        prompt.input = "studio.local".to_string();
        submit_prompt(&prompt, &mut menu, &store, &metrics);
        assert_eq!(store.get().role.master().unwrap().peer.host, "studio.local");

        prompt.input = "not a host".to_string();
        submit_prompt(&prompt, &mut menu, &store, &metrics);
        assert_eq!(store.get().role.master().unwrap().peer.host, "studio.local");
        assert_eq!(metrics.read().logs.back().unwrap().level, LogLevel::Warning);
    }
}
