use clap::Parser;
use client::config::{ClientConfig, PollTiming};
use client::network::{GameApi, HttpApi};
use client::overlay::OverlayPhase;
use client::session::Session;
use log::info;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the game server
    #[arg(short = 's', long, default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Tag of the game to join
    #[arg(short = 'g', long, required_unless_present = "new_game")]
    game: Option<String>,

    /// Ask the server for a fresh game tag instead of joining an existing game
    #[arg(short = 'n', long)]
    new_game: bool,

    /// Delay between hash checks after a successful check
    #[arg(long, default_value = "500")]
    poll_ms: u64,

    /// Delay before the next hash check after an error
    #[arg(long, default_value = "1000")]
    error_poll_ms: u64,

    /// How long failed submissions stay flagged
    #[arg(long, default_value = "1000")]
    flash_ms: u64,

    /// Give up on a request after this long
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Only change the config mode locally
    #[arg(long)]
    no_auto_mode: bool,
}

impl Args {
    fn client_config(&self, game_tag: &str) -> ClientConfig {
        let mut config = ClientConfig::new(&self.server, game_tag);
        config.timing = PollTiming {
            success: Duration::from_millis(self.poll_ms),
            error: Duration::from_millis(self.error_poll_ms),
        };
        config.error_flash = Duration::from_millis(self.flash_ms);
        config.auto_update_mode = !self.no_auto_mode;
        config.request_timeout = Duration::from_millis(self.timeout_ms);
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let game_tag = match (&args.game, args.new_game) {
        (Some(tag), false) => tag.clone(),
        _ => {
            let tag = HttpApi::with_timeout(&args.server, "", Duration::from_millis(args.timeout_ms))?
                .new_game_tag()
                .await?;
            info!("Server created game {}", tag);
            tag
        }
    };

    info!("Starting client...");
    info!("Connecting to: {} game {}", args.server, game_tag);

    let config = args.client_config(&game_tag);
    let api = HttpApi::with_timeout(&config.server, &config.game_tag, config.request_timeout)?;
    info!("Temporary id: {}", api.temporary_id());
    let session = Session::new(Arc::new(api), &config);
    session.start();

    let mut snapshots = session.mirror().subscribe();
    let mut overlay = session.subscribe_overlay();
    let mut errors = session.gateway().subscribe_error();
    let mut chat_seen = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(snapshot) = snapshots.borrow_and_update().clone() else {
                    continue;
                };

                info!(
                    "State {}: stage {:?}, {} players",
                    snapshot.state_hash,
                    snapshot.stage,
                    snapshot.players.len()
                );
                if chat_seen > snapshot.chat.len() {
                    chat_seen = 0;
                }
                for entry in &snapshot.chat[chat_seen..] {
                    info!("[chat] {}", entry.msg);
                }
                chat_seen = snapshot.chat.len();
                if !snapshot.controls.title.is_empty() {
                    info!("{}: {}", snapshot.controls.title, snapshot.controls.text);
                }
            }
            changed = overlay.changed() => {
                if changed.is_ok() && matches!(*overlay.borrow_and_update(), OverlayPhase::Transitioning { .. }) {
                    info!("You have been dealt into the game");
                }
            }
            changed = errors.changed() => {
                if changed.is_ok() {
                    if let Some(reason) = errors.borrow_and_update().clone() {
                        info!("Error: {}", reason);
                    }
                }
            }
        }
    }

    session.stop();
    info!("Client shut down");

    Ok(())
}
