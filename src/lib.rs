//! # Piano Room Client
//!
//! Async Rust client for Multiplayer-Piano-style rooms: a shared room where
//! participants chat, play notes and see each other's cursors, all over JSON
//! frames on a WebSocket.
//!
//! The client keeps one session alive on your behalf:
//!
//! - **Lifecycle**: connect, handshake, join the room, reconnect when the
//!   socket drops (three attempts, five seconds apart by default).
//! - **Ordering**: traffic that arrives or is sent before the room snapshot
//!   is held and replayed in order once the session is ready.
//! - **Roster**: participants are tracked by id, and chat authors are
//!   resolved against it.
//! - **Clock**: heartbeats keep a smoothed estimate of the server clock.
//! - **Transport-agnostic**: implement [`Connector`] and [`Transport`] for
//!   any backend; the default `transport-websocket` feature provides
//!   [`WebSocketConnector`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), piano_room_client::SessionError> {
//! use piano_room_client::{RoomClient, SessionConfig, SessionEvent, WebSocketConnector};
//!
//! let (mut client, mut events) =
//!     RoomClient::start(SessionConfig::from_env(), WebSocketConnector::new());
//! client.connect().await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::ParticipantAdded(p) = event {
//!         println!("{} joined", p.name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod lifecycle;
mod manager;
pub mod protocol;
pub mod queue;
pub mod reconnect;
pub mod roster;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::RoomClient;
pub use config::SessionConfig;
pub use error::SessionError;
pub use error_codes::ErrorCode;
pub use event::{Author, ChatMessage, Participant, SessionEvent};
pub use lifecycle::LifecycleState;
pub use manager::SendOutcome;
pub use protocol::{ClientMessage, Inbound, ServerMessage};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
