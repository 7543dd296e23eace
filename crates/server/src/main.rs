mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use bomber::{RelayServer, ServerConfig, ServerEvent};
use tui::TuiState;

#[derive(Parser)]
#[command(name = "bomber-server")]
#[command(about = "Bomberman relay server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = bomber::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 64)]
    max_clients: usize,

    #[arg(long, help = "Log to stderr instead of showing the dashboard")]
    headless: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let config = ServerConfig {
        max_clients: args.max_clients,
        ..Default::default()
    };

    let mut server = RelayServer::bind(&bind_addr, config)?;

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("Bomberman relay listening on {}", server.local_addr());
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn log_event(tui_state: &mut TuiState, event: ServerEvent) {
    match event {
        ServerEvent::ClientConnected { connection, addr } => {
            tui_state.log_info(format!("Connection {} opened from {}", connection, addr));
        }
        ServerEvent::ClientDisconnected { connection, reason } => {
            tui_state.log_info(format!("Connection {} {}", connection, reason.as_str()));
        }
        ServerEvent::ConnectionDenied { addr, reason } => {
            tui_state.log_warn(format!("Connection denied to {}: {}", addr, reason));
        }
        ServerEvent::PlayerJoined {
            connection,
            player_id,
            nickname,
        } => {
            tui_state.log_info(format!(
                "{} joined as {} on connection {}",
                nickname, player_id, connection
            ));
        }
        ServerEvent::PlayerLeft {
            player_id,
            nickname,
        } => {
            tui_state.log_info(format!("{} ({}) left", nickname, player_id));
        }
        ServerEvent::NicknameRejected { connection, reason } => {
            tui_state.log_warn(format!("Connection {}: {}", connection, reason));
        }
        ServerEvent::ProtocolError {
            connection,
            message,
        } => {
            tui_state.log_warn(format!("Connection {}: {}", connection, message));
        }
        ServerEvent::Error { message } => {
            tui_state.log_error(message);
        }
    }
}

fn run_with_tui(server: &mut RelayServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    tui_state.log_info(format!("Listening on {}", server.local_addr()));

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            log_event(&mut tui_state, event);
        }

        if let Some(connection) = tui_state.take_pending_kick() {
            server.kick(connection);
            for event in server.drain_events() {
                log_event(&mut tui_state, event);
            }
        }

        if event::poll(Duration::from_millis(1))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            let connections = server.connection_infos();
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    running.store(false, Ordering::SeqCst);
                }
                KeyCode::PageUp => tui_state.scroll_up(),
                KeyCode::PageDown => tui_state.scroll_down(),
                KeyCode::End => tui_state.scroll_to_bottom(),
                KeyCode::Up => tui_state.select_prev_connection(connections.len()),
                KeyCode::Down => tui_state.select_next_connection(connections.len()),
                KeyCode::Char('k') | KeyCode::Char('K') => tui_state.request_kick(&connections),
                _ => {}
            }
        }

        let stats = server.stats();
        let connections = server.connection_infos();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &connections);
        })?;
    }

    tui_state.log_info("Shutting down...");
    server.shutdown_connections();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
