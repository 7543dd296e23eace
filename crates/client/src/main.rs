use std::path::PathBuf;

use clap::Parser;

use bomber::DEFAULT_PORT;
use bomber_client::frame::DEFAULT_TARGET_FPS;
use bomber_client::tui::{self, TerminalMount};
use bomber_client::{App, ClientConfig, ServerClient, TransportMode};

#[derive(Parser)]
#[command(name = "bomber")]
#[command(about = "Bomberman terminal client")]
struct Args {
    #[arg(short, long, help = "Relay server address (host:port)")]
    server: Option<String>,

    #[arg(long, help = "Play without a server; nicknames are accepted locally")]
    offline: bool,

    #[arg(long, default_value_t = DEFAULT_TARGET_FPS, help = "Target frames per second")]
    fps: u32,

    #[arg(long, default_value_t = 5, help = "Reconnect attempts before going offline")]
    max_reconnect_attempts: u32,

    #[arg(long, help = "Append log output to this file (filtered by RUST_LOG)")]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.log_file {
        tui::file_logger(path)?.init();
    }

    let mode = if args.offline {
        TransportMode::Simulated
    } else {
        let addr = args
            .server
            .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_PORT));
        TransportMode::Real(addr)
    };

    let config = ClientConfig {
        max_reconnect_attempts: args.max_reconnect_attempts,
        ..ClientConfig::default()
    };
    let client = ServerClient::new(config, mode);

    let mount = TerminalMount::new()?;
    let mut app = App::new(client, mount, args.fps);
    tui::run(&mut app)?;

    log::info!("Exiting");
    Ok(())
}
