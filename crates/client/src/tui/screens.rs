use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use crate::app::{NicknameForm, Scene};
use crate::frame::FrameState;
use crate::frame::state::TILE_SIZE;
use crate::net::ConnectionState;

const MIN_GRID_COLS: i32 = 15;
const MIN_GRID_ROWS: i32 = 11;

pub fn render(frame: &mut Frame, scene: &Scene) {
    let area = frame.area();

    let block = Block::default()
        .title(" Bomberman ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(block, area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0)])
        .split(area)[0];

    match scene {
        Scene::Nickname { form, connection } => {
            render_nickname(frame, inner, form, *connection)
        }
        Scene::Loading { message } => render_loading(frame, inner, message),
        Scene::Game(state) => render_game(frame, inner, state),
    }
}

fn render_nickname(
    frame: &mut Frame,
    area: Rect,
    form: &NicknameForm,
    connection: ConnectionState,
) {
    let dialog_area = centered_rect(56, 16, area);
    frame.render_widget(Clear, dialog_area);

    let dialog = Block::default()
        .title(" Enter your nickname to start playing ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(dialog, dialog_area);

    let inner = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(4),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(dialog_area);

    let input_block = Block::default()
        .title(" Nickname ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let cursor = if form.is_loading { "" } else { "_" };
    let input = Paragraph::new(format!("{}{}", form.input, cursor))
        .style(Style::default().fg(Color::White))
        .block(input_block);
    frame.render_widget(input, inner[0]);

    if let Some(error) = &form.error {
        let error_text = Paragraph::new(error.as_str())
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center);
        frame.render_widget(error_text, inner[1]);
    }

    let requirements = Paragraph::new(vec![
        Line::from("Requirements:"),
        Line::from("  2-20 characters"),
        Line::from("  Letters, numbers, underscore, and dash only"),
        Line::from("  No spaces or special characters"),
    ])
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(requirements, inner[2]);

    let (status, color) = connection_label(connection);
    let status_line = Line::from(vec![
        Span::styled("● ", Style::default().fg(color)),
        Span::styled(status, Style::default().fg(Color::White)),
    ]);
    frame.render_widget(Paragraph::new(status_line), inner[3]);

    let action = if form.is_loading { "Joining..." } else { "Enter Start Game" };
    let help = Paragraph::new(format!("{}  Esc Quit", action))
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, inner[5]);
}

fn connection_label(connection: ConnectionState) -> (&'static str, Color) {
    match connection {
        ConnectionState::Connected => ("Connected to server", Color::Green),
        ConnectionState::Connecting => ("Connecting to server...", Color::Yellow),
        ConnectionState::Reconnecting => ("Reconnecting to server...", Color::Yellow),
        ConnectionState::Disconnected => ("Disconnected", Color::Red),
        ConnectionState::Offline => ("Offline mode (no server connection)", Color::Red),
    }
}

fn render_loading(frame: &mut Frame, area: Rect, message: &str) {
    let dialog_area = centered_rect(40, 5, area);
    frame.render_widget(Clear, dialog_area);

    let dialog = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    let text = Paragraph::new(message)
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Center)
        .block(dialog);
    frame.render_widget(text, dialog_area);
}

fn render_game(frame: &mut Frame, area: Rect, state: &FrameState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let (online, color) = if state.is_online() {
        ("Online", Color::Green)
    } else {
        ("Offline", Color::Red)
    };
    let hud = Line::from(vec![
        Span::styled(
            format!("Player: {}", state.player.nickname),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(format!("Score: {}", state.score)),
        Span::raw("  "),
        Span::raw(format!("FPS: {}", state.fps)),
        Span::raw("  "),
        Span::styled("● ", Style::default().fg(color)),
        Span::raw(online),
    ]);
    frame.render_widget(Paragraph::new(hud), chunks[0]);

    frame.render_widget(Paragraph::new(board_lines(state)), chunks[1]);

    let help = Paragraph::new("Space Place bomb  Q Quit")
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center);
    frame.render_widget(help, chunks[2]);
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Cell {
    Floor,
    Wall,
    Block,
    Bomb,
    Explosion,
    Player,
}

impl Cell {
    fn span(self) -> Span<'static> {
        match self {
            Cell::Floor => Span::styled("  ", Style::default()),
            Cell::Wall => Span::styled("██", Style::default().fg(Color::Gray)),
            Cell::Block => Span::styled("▒▒", Style::default().fg(Color::Yellow)),
            Cell::Bomb => Span::styled("()", Style::default().fg(Color::Red)),
            Cell::Explosion => Span::styled("**", Style::default().fg(Color::LightRed)),
            Cell::Player => Span::styled(
                "@@",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
        }
    }
}

// Positions are in pixels on a 32px grid; each tile is two terminal columns.
fn board_lines(state: &FrameState) -> Vec<Line<'static>> {
    let tile = |x: i32, y: i32| (x.div_euclid(TILE_SIZE), y.div_euclid(TILE_SIZE));

    let mut cells: Vec<((i32, i32), Cell)> = Vec::new();
    cells.extend(state.walls.iter().map(|w| (tile(w.x, w.y), Cell::Wall)));
    cells.extend(state.blocks.iter().map(|b| (tile(b.x, b.y), Cell::Block)));
    cells.extend(state.bombs.iter().map(|b| (tile(b.x, b.y), Cell::Bomb)));
    cells.extend(state.explosions.iter().map(|e| (tile(e.x, e.y), Cell::Explosion)));
    cells.push((tile(state.player.x, state.player.y), Cell::Player));

    let cols = cells
        .iter()
        .map(|((x, _), _)| x + 1)
        .max()
        .unwrap_or(0)
        .max(MIN_GRID_COLS);
    let rows = cells
        .iter()
        .map(|((_, y), _)| y + 1)
        .max()
        .unwrap_or(0)
        .max(MIN_GRID_ROWS);

    let mut grid = vec![vec![Cell::Floor; cols as usize]; rows as usize];
    // Later entries are drawn over earlier ones.
    for ((x, y), cell) in cells {
        if x >= 0 && y >= 0 {
            grid[y as usize][x as usize] = cell;
        }
    }

    grid.into_iter()
        .map(|row| Line::from(row.into_iter().map(Cell::span).collect::<Vec<_>>()))
        .collect()
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameEvent;

    #[test]
    fn test_board_covers_start_layout() {
        let state = FrameState::initial("bomber42", None, ConnectionState::Offline);
        let lines = board_lines(&state);
        assert_eq!(lines.len(), MIN_GRID_ROWS as usize);
        // Wall at the origin, player at tile (2, 2).
        assert_eq!(lines[0].spans[0].content, "██");
        assert_eq!(lines[2].spans[2].content, "@@");
        // Block at (256, 192) -> tile (8, 6).
        assert_eq!(lines[6].spans[8].content, "▒▒");
    }

    #[test]
    fn test_bomb_under_player_hidden_by_player() {
        let state = FrameState::initial("bomber42", None, ConnectionState::Offline).apply(
            FrameEvent::PlaceBomb {
                x: 64,
                y: 64,
                owner: None,
            },
        );
        let lines = board_lines(&state);
        assert_eq!(lines[2].spans[2].content, "@@");
    }
}
