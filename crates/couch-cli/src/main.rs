//! # couch
//!
//! Terminal client binary: logs in, picks or creates a session, and chats
//! over that session's real-time channel.

#![deny(unsafe_code)]

mod input;
mod render;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use couch_auth::{BackendClient, TokenStore};
use couch_channel::{ChannelConfig, ChannelSupervisor, WsConnector};
use couch_core::{SessionId, SessionIdentity};
use couch_settings::CouchSettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::input::Input;

/// Couch terminal client.
#[derive(Parser, Debug)]
#[command(name = "couch", about = "Talk to your therapist from the terminal", version)]
struct Cli {
    /// Account username.
    #[arg(long, short, env = "COUCH_USERNAME")]
    username: String,

    /// Account password.
    #[arg(long, env = "COUCH_PASSWORD", hide_env_values = true)]
    password: String,

    /// Backend base URL (overrides settings).
    #[arg(long)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List your sessions.
    Sessions,
    /// Start a new session and print its id.
    New,
    /// Chat in a session. Starts a new one unless `--session` is given.
    Chat {
        /// Existing session to join.
        #[arg(long, short)]
        session: Option<String>,
    },
}

fn load_settings(args: &Cli) -> CouchSettings {
    let path = couch_settings::settings_path();
    let mut settings = couch_settings::load_settings_from_path(&path).unwrap_or_else(|e| {
        eprintln!("warning: ignoring {}: {e}", path.display());
        let mut defaults = CouchSettings::default();
        couch_settings::loader::apply_env_overrides(&mut defaults);
        defaults
    });
    if let Some(url) = &args.backend_url {
        settings.backend.base_url.clone_from(url);
    }
    settings
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load_settings(&args);

    if settings.logging.json {
        couch_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        couch_core::logging::init_subscriber(&settings.logging.level);
    }

    let base = settings
        .backend
        .http_base()
        .context("Invalid backend URL")?;
    let client = BackendClient::new(
        base,
        Duration::from_millis(settings.backend.request_timeout_ms),
    )
    .context("Failed to build HTTP client")?;

    let store = TokenStore::new();
    let identity = store
        .login(&client, &args.username, &args.password)
        .await
        .context("Login failed")?;

    let result = match args.command.unwrap_or(Command::Chat { session: None }) {
        Command::Sessions => {
            let sessions = client
                .list_sessions(&identity)
                .await
                .context("Failed to list sessions")?;
            println!("{}", render::sessions_table(&sessions));
            Ok(())
        }
        Command::New => {
            let id = client
                .create_session(&identity)
                .await
                .context("Failed to create session")?;
            println!("{id}");
            Ok(())
        }
        Command::Chat { session } => {
            let session_id = match session {
                Some(id) => SessionId::from(id),
                None => client
                    .create_session(&identity)
                    .await
                    .context("Failed to create session")?,
            };
            run_chat(&settings, &identity, session_id).await
        }
    };

    let _ = store.logout();
    result
}

/// Interactive loop: stdin lines go to the channel, channel updates go to
/// the terminal.
async fn run_chat(
    settings: &CouchSettings,
    identity: &SessionIdentity,
    session_id: SessionId,
) -> Result<()> {
    let ws_base = settings
        .backend
        .websocket_base()
        .context("Invalid WebSocket URL")?;
    let connector = Arc::new(WsConnector::new(settings.channel.outbound_queue));
    let config = ChannelConfig::from(&settings.channel);
    let close_grace = config.close_grace;

    let mut supervisor = ChannelSupervisor::new(connector, ws_base, config);
    let mut updates = supervisor.subscribe();
    let mut channel_id = supervisor
        .open(session_id.clone(), identity)
        .context("Failed to open channel")?;

    let name = if identity.first_name.is_empty() {
        "there"
    } else {
        identity.first_name.as_str()
    };
    println!("Hi {name}, you're in session {session_id}. Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                match input::parse_line(&line) {
                    Input::Empty => {}
                    Input::Quit => break,
                    Input::Help => println!("{}", input::HELP),
                    Input::Log => {
                        for message in supervisor.messages() {
                            println!("{}", render::message_line(&message, &identity.first_name));
                        }
                    }
                    Input::Reconnect => {
                        supervisor.close();
                        channel_id = supervisor
                            .open(session_id.clone(), identity)
                            .context("Failed to reopen channel")?;
                    }
                    Input::Unknown(command) => eprintln!("unknown command /{command}, type /help"),
                    Input::Message(text) => {
                        // Fatal errors also arrive as updates.
                        if let Err(e) = supervisor.send(text).await {
                            if !e.is_fatal() {
                                eprintln!("[{}]", render::error_line(&e));
                            }
                        }
                    }
                }
            }
            update = updates.recv() => match update {
                Ok(update) if update.channel_id == channel_id => {
                    if let Some((line, status)) = render::update_line(&update.kind) {
                        if status {
                            eprintln!("[{line}]");
                        } else {
                            println!("{line}");
                        }
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "terminal fell behind channel updates");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(handle) = supervisor.current() {
        handle.close();
        let _ = tokio::time::timeout(close_grace, handle.terminated()).await;
    }
    supervisor.close();
    Ok(())
}
