mod screens;

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::app::{App, Scene};
use crate::frame::Mount;

const MAX_POLL_WAIT: Duration = Duration::from_millis(50);

/// Logger that appends to `path`. Stderr shares the terminal with the
/// alternate screen, so the TUI never logs there.
pub fn file_logger(path: &Path) -> io::Result<env_logger::Builder> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.target(env_logger::Target::Pipe(Box::new(file)));
    Ok(builder)
}

/// Mounts scenes on the real terminal. Raw mode and the alternate screen are
/// held for the lifetime of the value.
pub struct TerminalMount {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalMount {
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }

    pub fn restore_terminal(&mut self) -> io::Result<()> {
        terminal::disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            cursor::Show
        )?;
        Ok(())
    }
}

impl Mount<Scene> for TerminalMount {
    fn mount(&mut self, scene: &Scene) -> anyhow::Result<()> {
        self.terminal.draw(|frame| screens::render(frame, scene))?;
        Ok(())
    }
}

impl Drop for TerminalMount {
    fn drop(&mut self) {
        let _ = self.restore_terminal();
    }
}

/// Drives the app until the user quits: pump, then wait for input no longer
/// than the time left until the next frame.
pub fn run(app: &mut App<TerminalMount>) -> io::Result<()> {
    app.start(Instant::now());

    while !app.should_quit() {
        app.pump(Instant::now());

        let wait = app.time_until_next_frame(Instant::now()).min(MAX_POLL_WAIT);
        if event::poll(wait)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    app.handle_key(key.code, key.modifiers, Instant::now());
                }
                Event::Resize(_, _) => app.redraw(),
                _ => {}
            }
        }
    }

    app.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;

    #[test]
    fn test_file_logger_writes_to_file() {
        let path = std::env::temp_dir().join(format!("bomber-log-{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let logger = file_logger(&path)
            .unwrap()
            .filter_level(log::LevelFilter::Info)
            .build();
        logger.log(
            &log::Record::builder()
                .args(format_args!("connected to relay"))
                .level(log::Level::Info)
                .target("bomber_client")
                .build(),
        );
        logger.flush();

        let written = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(written.contains("connected to relay"));
    }
}
