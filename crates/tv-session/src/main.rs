mod bridge;
mod buffer;
mod config;
mod engine;
mod events;
mod input;
mod retry;
mod session;
mod sim;
mod state;
mod timers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tv_bridge_types::{RemoteKey, RemoteKeyEvent};

use crate::bridge::ContentBridge;
use crate::events::{SessionEvent, SessionEventBus};
use crate::input::MenuAction;
use crate::session::{SessionCommand, SessionController};

#[derive(Parser, Debug)]
#[command(name = "tv-session")]
struct Args {
    /// Optional player config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tv_session=info")),
        )
        .init();

    let cfg = match args.config.as_ref() {
        Some(path) => config::PlayerConfig::load(path)?,
        None => config::PlayerConfig::default(),
    };
    let retry_config = config::retry_from_config(&cfg);
    let features = config::features_from_config(&cfg)?;
    let mut channels = config::channels_from_config(&cfg);
    if channels.is_empty() {
        channels = sim::demo_channels();
    }
    if !channels.iter().any(|c| c.is_current) {
        if let Some(first) = channels.first_mut() {
            first.is_current = true;
        }
    }
    tracing::info!(
        channels = channels.len(),
        ?features,
        "starting tv-session"
    );

    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let engine = sim::SimulatedEngine::new(engine_tx, 8_000_000);
    let bridge = Arc::new(sim::StaticBridge::new(channels.clone()));
    let events = SessionEventBus::new();
    spawn_event_printer(&events);

    let (controller, cmd_tx) = SessionController::new(
        engine,
        engine_rx,
        bridge.clone(),
        features,
        retry_config,
        channels,
        events,
    );

    let initial = match bridge.advance_stream().await {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(error = %e, "no initial stream available");
            None
        }
    };

    {
        let cmd_tx = cmd_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = cmd_tx.send(SessionCommand::Shutdown);
            }
        });
    }

    crossterm::terminal::enable_raw_mode()?;
    spawn_key_reader(cmd_tx);

    tracing::info!(
        "keys: arrows = d-pad, Enter = OK, Esc = back, digits = jump, \
         s/g/c/n/t = menu actions, q = quit"
    );
    controller.run(initial).await;
    crossterm::terminal::disable_raw_mode().ok();
    Ok(())
}

/// Relay session events into the log stream.
fn spawn_event_printer(bus: &SessionEventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SessionEvent::Notice { message }) => tracing::info!(%message, "notice"),
                Ok(SessionEvent::OverlayChanged { overlay }) => {
                    tracing::info!(?overlay, "overlay changed")
                }
                Ok(SessionEvent::ChannelBadge { number, name }) => {
                    tracing::info!(?number, %name, "channel")
                }
                Ok(SessionEvent::RetryProgress { attempt, total }) => {
                    tracing::info!(attempt, total, "reactivating video")
                }
                Ok(SessionEvent::SessionEnded) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Read terminal keys on a dedicated thread and feed them to the session.
///
/// Each terminal press maps to a down/up pair; menu actions get dedicated
/// letter keys since the demo has no focusable buttons.
fn spawn_key_reader(cmd_tx: mpsc::UnboundedSender<SessionCommand>) {
    std::thread::spawn(move || {
        loop {
            let Ok(event) = event::read() else { break };
            let CEvent::Key(key) = event else { continue };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            let sent = match key.code {
                KeyCode::Char('q') => {
                    let _ = cmd_tx.send(SessionCommand::Shutdown);
                    break;
                }
                KeyCode::Char('s') => cmd_tx.send(SessionCommand::Menu(MenuAction::Scrub)),
                KeyCode::Char('g') => cmd_tx.send(SessionCommand::Menu(MenuAction::Guide)),
                KeyCode::Char('c') => cmd_tx.send(SessionCommand::Menu(MenuAction::NextChannel)),
                KeyCode::Char('n') => cmd_tx.send(SessionCommand::Menu(MenuAction::NextStream)),
                KeyCode::Char('t') => cmd_tx.send(SessionCommand::Menu(MenuAction::Subtitles)),
                code => match remote_key(code) {
                    Some(remote) => {
                        let down = cmd_tx.send(SessionCommand::Key(RemoteKeyEvent::down(remote)));
                        let up = cmd_tx.send(SessionCommand::Key(RemoteKeyEvent::up(remote)));
                        down.and(up)
                    }
                    None => Ok(()),
                },
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

fn remote_key(code: KeyCode) -> Option<RemoteKey> {
    match code {
        KeyCode::Enter => Some(RemoteKey::Center),
        KeyCode::Up => Some(RemoteKey::Up),
        KeyCode::Down => Some(RemoteKey::Down),
        KeyCode::Left => Some(RemoteKey::Left),
        KeyCode::Right => Some(RemoteKey::Right),
        KeyCode::Esc | KeyCode::Backspace => Some(RemoteKey::Back),
        KeyCode::Char(c) if c.is_ascii_digit() => Some(RemoteKey::Digit(c as u8 - b'0')),
        _ => None,
    }
}
