//! # Room Chat Demo
//!
//! Joins a room, prints chat and membership changes, and echoes lines typed
//! on stdin into the room chat:
//!
//! 1. Build the configuration from `PIANO_*` environment variables
//! 2. Connect over WebSocket and wait for the room snapshot
//! 3. Print chat, joins and leaves as they happen
//! 4. Tear down on Ctrl+C or when the session terminates
//!
//! ## Running
//!
//! ```sh
//! # Against a local server:
//! PIANO_GATEWAY_URL=ws://localhost:8080 cargo run --example room_chat
//!
//! # Pick a room and name:
//! PIANO_ROOM=test PIANO_USERNAME=RustBot cargo run --example room_chat
//!
//! # The public wss:// gateway needs TLS:
//! cargo run --example room_chat --features tls
//! ```

use piano_room_client::{
    Author, RoomClient, SendOutcome, SessionConfig, SessionEvent, WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = SessionConfig::from_env();
    tracing::info!(
        "Joining room '{}' as '{}' via {}",
        config.room,
        config.username,
        config.resolve_endpoint()?
    );

    let connector =
        WebSocketConnector::new().with_timeout(std::time::Duration::from_secs(10));
    let (mut client, mut events) = RoomClient::start(config, connector);
    client.connect().await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    SessionEvent::Ready => {
                        let people = client.participants().await;
                        tracing::info!("Ready: {} participant(s) in the room", people.len());
                    }
                    SessionEvent::ChatReceived(chat) => {
                        let who = match &chat.author {
                            Author::Known(p) => p.name.clone(),
                            Author::Unknown { id, name } => {
                                format!("{} (unknown {id})", name.as_deref().unwrap_or("?"))
                            }
                        };
                        println!("<{who}> {}", chat.content);
                    }
                    SessionEvent::ParticipantAdded(p) => println!("* {} joined", p.name),
                    SessionEvent::ParticipantUpdated(p) => println!("* {} is now known as {}", p.id, p.name),
                    SessionEvent::ParticipantRemoved(p) => {
                        let name = if p.name.is_empty() { p.id.as_str() } else { p.name.as_str() };
                        println!("* {name} left");
                    }
                    SessionEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("closed by server"));
                    }
                    SessionEvent::Terminated { reason } => {
                        tracing::error!("Session terminated: {reason}");
                        break;
                    }
                    SessionEvent::StateChanged { from, to } => {
                        tracing::debug!("{from} -> {to}");
                    }
                    SessionEvent::Debug(text) => tracing::debug!("{text}"),
                    SessionEvent::RoomSnapshot { .. } | SessionEvent::Opcode { .. } => {}
                }
            }

            line = stdin.next_line() => {
                match line {
                    Ok(Some(line)) if !line.trim().is_empty() => {
                        if client.send_chat(line).await? == SendOutcome::Rejected {
                            tracing::warn!("Not in a room yet; message dropped");
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) | Err(_) => {
                        tracing::info!("stdin closed, leaving");
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving");
                break;
            }
        }
    }

    // ── Teardown ────────────────────────────────────────────────────
    client.destroy().await;
    tracing::info!("Done");
    Ok(())
}
