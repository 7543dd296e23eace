use std::collections::VecDeque;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph};

use bomber::{ConnectionId, ConnectionInfo, ServerStats};

const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct TuiState {
    log: VecDeque<LogEntry>,
    scroll: usize,
    selected: usize,
    pending_kick: Option<ConnectionId>,
}

impl TuiState {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        if self.log.len() == MAX_LOG_ENTRIES {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry { level, message });
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Info, message.into());
    }

    pub fn log_warn(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Warn, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.push_log(LogLevel::Error, message.into());
    }

    pub fn log_entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    /// Lines scrolled up from the newest entry.
    pub fn scroll_up(&mut self) {
        self.scroll = (self.scroll + 5).min(self.log.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll = self.scroll.saturating_sub(5);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    pub fn select_prev_connection(&mut self, count: usize) {
        if count > 0 {
            self.selected = self.selected.min(count - 1).saturating_sub(1);
        }
    }

    pub fn select_next_connection(&mut self, count: usize) {
        if count > 0 {
            self.selected = (self.selected + 1).min(count - 1);
        }
    }

    pub fn selected_connection(&self, connections: &[ConnectionInfo]) -> Option<ConnectionId> {
        connections
            .get(self.selected.min(connections.len().saturating_sub(1)))
            .map(|info| info.connection)
    }

    pub fn request_kick(&mut self, connections: &[ConnectionInfo]) {
        self.pending_kick = self.selected_connection(connections);
    }

    pub fn take_pending_kick(&mut self) -> Option<ConnectionId> {
        self.pending_kick.take()
    }
}

pub fn render(
    frame: &mut Frame,
    state: &TuiState,
    stats: &ServerStats,
    connections: &[ConnectionInfo],
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Percentage(40),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], stats);
    render_capacity(frame, chunks[1], stats);
    render_network(frame, chunks[2], stats);
    render_connections(frame, chunks[3], state, connections);
    render_log(frame, chunks[4], state);
    render_help(frame, chunks[5]);
}

fn render_header(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let uptime = format_duration(stats.uptime_secs);
    let title = format!(" Bomberman Relay - Uptime: {} ", uptime);

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let text = format!(
        "Connections: {}  |  Players: {}",
        stats.connection_count, stats.player_count
    );

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(paragraph, area);
}

fn render_capacity(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Capacity ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let max = stats.max_clients.max(1);
    let ratio = stats.connection_count as f64 / max as f64;
    let gauge = Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(ratio.min(1.0))
        .label(format!("{}/{} clients", stats.connection_count, stats.max_clients));

    frame.render_widget(gauge, area);
}

fn render_network(frame: &mut Frame, area: Rect, stats: &ServerStats) {
    let block = Block::default()
        .title(" Network ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let net = &stats.network_stats;
    let lines = vec![
        Line::from(vec![
            Span::styled("Frames: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{} sent / {} recv ({} sent, {} recv)",
                    net.frames_sent,
                    net.frames_received,
                    format_bytes(net.bytes_sent),
                    format_bytes(net.bytes_received)
                ),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Malformed: ", Style::default().fg(Color::Gray)),
            Span::styled(
                net.malformed_frames.to_string(),
                Style::default().fg(if net.malformed_frames > 0 {
                    Color::Red
                } else {
                    Color::White
                }),
            ),
        ]),
    ];

    let paragraph = Paragraph::new(lines).block(block);
    frame.render_widget(paragraph, area);
}

fn render_connections(
    frame: &mut Frame,
    area: Rect,
    state: &TuiState,
    connections: &[ConnectionInfo],
) {
    let block = Block::default()
        .title(" Connections ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let selected = state.selected_connection(connections);
    let items: Vec<ListItem> = connections
        .iter()
        .map(|info| {
            let player = match &info.player {
                Some(player) => format!("{} ({})", player.nickname, player.id),
                None => "unregistered".to_string(),
            };
            let text = format!(
                "#{:<4} {:<22} {:<40} {}",
                info.connection,
                info.addr,
                player,
                format_duration(info.connected_secs)
            );
            let style = if Some(info.connection) == selected {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(text).style(style)
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn render_log(frame: &mut Frame, area: Rect, state: &TuiState) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let visible = area.height.saturating_sub(2) as usize;
    let entries: Vec<&LogEntry> = state.log_entries().collect();
    let end = entries.len().saturating_sub(state.scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = entries[start..end]
        .iter()
        .map(|entry| {
            let (tag, color) = match entry.level {
                LogLevel::Info => ("INFO ", Color::Green),
                LogLevel::Warn => ("WARN ", Color::Yellow),
                LogLevel::Error => ("ERROR", Color::Red),
            };
            Line::from(vec![
                Span::styled(tag, Style::default().fg(color)),
                Span::raw(" "),
                Span::styled(entry.message.clone(), Style::default().fg(Color::White)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let text = Paragraph::new("↑↓ Select  K Kick  PgUp/PgDn Scroll  End Latest  Q Quit").style(
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );

    frame.render_widget(text, area);
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
