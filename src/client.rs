//! Async client for piano rooms.
//!
//! [`RoomClient`] is a thin handle that talks to a background session task
//! over an unbounded MPSC channel. Events arrive on a bounded channel
//! ([`tokio::sync::mpsc::Receiver<SessionEvent>`]) returned from
//! [`RoomClient::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), piano_room_client::SessionError> {
//! use piano_room_client::{RoomClient, SessionConfig, SessionEvent, WebSocketConnector};
//!
//! let config = SessionConfig::new("Alice", "lobby");
//! let (mut client, mut events) = RoomClient::start(config, WebSocketConnector::new());
//! client.connect().await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Ready => {
//!             client.send_chat("hello").await?;
//!         }
//!         SessionEvent::ChatReceived(chat) => {
//!             println!("{}: {}", chat.author.name().unwrap_or("?"), chat.content);
//!         }
//!         SessionEvent::Terminated { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.destroy().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::clock::local_time_ms;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::error_codes::ErrorCode;
use crate::event::{Participant, SessionEvent};
use crate::lifecycle::LifecycleState;
use crate::manager::{Command, Manager, SendOutcome, SessionShared};
use crate::protocol::{ClientMessage, ParticipantId, RoomId, UserSettings};
use crate::transport::Connector;

/// Async client handle for one room session.
///
/// Created via [`RoomClient::start`], which spawns the session task and
/// returns this handle together with an event receiver. Nothing touches the
/// network until [`connect`](Self::connect) is called.
pub struct RoomClient {
    /// Sender half of the command channel to the session task.
    cmd_tx: mpsc::UnboundedSender<Command>,
    /// State written by the session task.
    shared: Arc<SessionShared>,
    state_rx: watch::Receiver<LifecycleState>,
    /// Handle to the session task.
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_timeout: Duration,
    destroyed: bool,
}

impl RoomClient {
    /// Spawn the session task and return a handle plus event receiver.
    ///
    /// `connector` opens the socket for [`connect`](Self::connect) and for
    /// every reconnection attempt.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        config: SessionConfig,
        connector: impl Connector,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);

        let shared = Arc::new(SessionShared::new(&config));
        let shutdown_timeout = config.shutdown_timeout;

        let manager = Manager::new(
            config,
            Arc::new(connector),
            Arc::clone(&shared),
            state_tx,
            event_tx,
        );
        let task = tokio::spawn(manager.run(cmd_rx));

        let client = Self {
            cmd_tx,
            shared,
            state_rx,
            task: Some(task),
            shutdown_timeout,
            destroyed: false,
        };

        (client, event_rx)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open the socket and start the handshake.
    ///
    /// Resolves once the socket is open; [`SessionEvent::Ready`] follows when
    /// the room snapshot arrives.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SessionDestroyed`] after the session terminated.
    /// - [`SessionError::InvalidState`] unless the session is idle or
    ///   disconnected.
    /// - [`SessionError::InvalidArgument`] if the endpoint cannot be resolved.
    /// - The connector's error if the socket could not be opened. An
    ///   [`AuthorizationFailure`](SessionError::AuthorizationFailure) also
    ///   terminates the session; anything else leaves it disconnected.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_alive()?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        rx.await.map_err(|_| SessionError::SessionDestroyed)?
    }

    /// Start a reconnection attempt now instead of waiting for the delay.
    ///
    /// Returns `false` when the session is not disconnected or an attempt is
    /// already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionDestroyed`] after the session terminated.
    pub async fn reconnect(&self) -> Result<bool> {
        self.ensure_alive()?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Reconnect { reply })?;
        rx.await.map_err(|_| SessionError::SessionDestroyed)
    }

    /// Tear the session down: close the socket, stop every timer, drop the
    /// pending queue, and stop the session task.
    ///
    /// Safe to call more than once. After this returns the event receiver
    /// yields the final [`SessionEvent::Terminated`] and then `None`.
    pub async fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        debug!("RoomClient: destroy requested");
        self.destroyed = true;

        let _ = self.cmd_tx.send(Command::Destroy);

        // Await the session task with a timeout. If it doesn't exit in time,
        // abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session task did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session task aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Send a chat message to the room.
    ///
    /// Chat is only sent while ready; otherwise the outcome is
    /// [`SendOutcome::Rejected`].
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] for an empty message,
    /// [`SessionError::SessionDestroyed`] after termination.
    pub async fn send_chat(&self, message: impl Into<String>) -> Result<SendOutcome> {
        let message = message.into();
        if message.is_empty() {
            return Err(SessionError::invalid_argument(ErrorCode::EmptyMessage));
        }
        self.submit(ClientMessage::Chat { message }).await
    }

    /// Move to another room. Queued until ready when sent early.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] for an empty room name,
    /// [`SessionError::SessionDestroyed`] after termination.
    pub async fn set_room(&self, room: impl Into<RoomId>) -> Result<SendOutcome> {
        let room = room.into();
        if room.is_empty() {
            return Err(SessionError::InvalidArgument(
                ErrorCode::InvalidType.render(&["room", "non-empty string"]),
            ));
        }
        self.submit(ClientMessage::SetRoom { room }).await
    }

    /// Change the display name. Queued until ready when sent early.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] for an empty name,
    /// [`SessionError::SessionDestroyed`] after termination.
    pub async fn set_username(&self, name: impl Into<String>) -> Result<SendOutcome> {
        let name = name.into();
        if name.is_empty() {
            return Err(SessionError::InvalidArgument(
                ErrorCode::InvalidType.render(&["username", "non-empty string"]),
            ));
        }
        self.submit(ClientMessage::SetUser {
            set: UserSettings { name },
        })
        .await
    }

    /// Record the cursor position reported by the keep-alive ticker.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionDestroyed`] after termination.
    pub fn move_cursor(&self, x: f64, y: f64) -> Result<()> {
        self.ensure_alive()?;
        self.command(Command::MoveCursor { x, y })
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn state(&self) -> LifecycleState {
        if self.destroyed {
            return LifecycleState::Terminated;
        }
        *self.state_rx.borrow()
    }

    /// A receiver that observes every lifecycle change.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// Current roster, ordered by participant id.
    pub async fn participants(&self) -> Vec<Participant> {
        self.shared.roster.lock().await.participants()
    }

    pub async fn participant(&self, id: &str) -> Option<Participant> {
        self.shared.roster.lock().await.get(id).cloned()
    }

    /// Smoothed `server - local` clock offset in milliseconds.
    pub async fn clock_offset(&self) -> f64 {
        self.shared.clock.lock().await.offset()
    }

    /// Estimated server time now, in milliseconds since the Unix epoch.
    pub async fn server_time(&self) -> f64 {
        self.shared.clock.lock().await.server_time_at(local_time_ms())
    }

    /// Last measured heartbeat round trip in milliseconds.
    pub async fn round_trip(&self) -> Option<f64> {
        self.shared.clock.lock().await.round_trip()
    }

    /// Room reported by the latest snapshot.
    pub async fn current_room(&self) -> Option<RoomId> {
        self.shared.room.lock().await.clone()
    }

    /// Display name: the configured one until the server reports another.
    pub async fn username(&self) -> String {
        self.shared.username.lock().await.clone()
    }

    /// Our own participant id, once the server has assigned one.
    pub async fn participant_id(&self) -> Option<ParticipantId> {
        self.shared.participant_id.lock().await.clone()
    }

    /// When the session last became ready.
    pub async fn ready_at(&self) -> Option<SystemTime> {
        *self.shared.ready_at.lock().await
    }

    /// Time since the session last became ready.
    pub async fn uptime(&self) -> Option<Duration> {
        self.ready_at()
            .await
            .and_then(|at| SystemTime::now().duration_since(at).ok())
    }

    /// Reconnection attempts made since the session was last ready.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::Acquire)
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn ensure_alive(&self) -> Result<()> {
        if self.state().is_terminal() {
            return Err(SessionError::SessionDestroyed);
        }
        Ok(())
    }

    fn command(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| SessionError::SessionDestroyed)
    }

    async fn submit(&self, message: ClientMessage) -> Result<SendOutcome> {
        self.ensure_alive()?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { message, reply })?;
        rx.await.map_err(|_| SessionError::SessionDestroyed)
    }
}

impl std::fmt::Debug for RoomClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomClient")
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        // `Drop` cannot await the graceful path, so the task is aborted and
        // the socket is dropped with it.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use async_trait::async_trait;

    /// Connector whose sockets never open.
    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Transport>> {
            Err(SessionError::ConnectionFailure("refused".into()))
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::new("Alice", "lobby").with_gateway_url("ws://127.0.0.1:1")
    }

    #[tokio::test]
    async fn starts_idle() {
        let (mut client, _events) = RoomClient::start(config(), RefusingConnector);
        assert_eq!(client.state(), LifecycleState::Idle);
        assert!(!client.is_ready());
        assert!(client.participants().await.is_empty());
        assert_eq!(client.username().await, "Alice");
        assert_eq!(client.clock_offset().await, 0.0);
        assert!(client.ready_at().await.is_none());
        client.destroy().await;
    }

    #[tokio::test]
    async fn empty_chat_is_invalid() {
        let (mut client, _events) = RoomClient::start(config(), RefusingConnector);
        let err = client.send_chat("").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        client.destroy().await;
    }

    #[tokio::test]
    async fn empty_room_and_name_are_invalid() {
        let (mut client, _events) = RoomClient::start(config(), RefusingConnector);
        assert!(matches!(
            client.set_room("").await,
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.set_username("").await,
            Err(SessionError::InvalidArgument(_))
        ));
        client.destroy().await;
    }

    #[tokio::test]
    async fn failed_connect_leaves_session_disconnected() {
        let (mut client, _events) = RoomClient::start(config(), RefusingConnector);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionFailure(_)));
        assert_eq!(client.state(), LifecycleState::Disconnected);
        client.destroy().await;
    }

    #[tokio::test]
    async fn unresolvable_gateway_is_rejected_before_connecting() {
        let config = SessionConfig::new("Alice", "lobby").with_gateway_url("http://nope");
        let (mut client, _events) = RoomClient::start(config, RefusingConnector);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        assert_eq!(client.state(), LifecycleState::Idle);
        client.destroy().await;
    }

    #[tokio::test]
    async fn operations_after_destroy_fail() {
        let (mut client, _events) = RoomClient::start(config(), RefusingConnector);
        client.destroy().await;
        client.destroy().await;

        assert_eq!(client.state(), LifecycleState::Terminated);
        assert!(matches!(
            client.connect().await,
            Err(SessionError::SessionDestroyed)
        ));
        assert!(matches!(
            client.send_chat("hi").await,
            Err(SessionError::SessionDestroyed)
        ));
        assert!(matches!(
            client.move_cursor(1.0, 2.0),
            Err(SessionError::SessionDestroyed)
        ));
    }

    #[tokio::test]
    async fn destroy_emits_terminated_then_closes_channel() {
        let (mut client, mut events) = RoomClient::start(config(), RefusingConnector);
        client.destroy().await;

        let mut terminated = false;
        while let Some(event) = events.recv().await {
            if let SessionEvent::Terminated { reason } = event {
                assert_eq!(reason, ErrorCode::WsCloseRequested.message());
                terminated = true;
            }
        }
        assert!(terminated);
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (mut client, _events) = RoomClient::start(config(), RefusingConnector);
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("RoomClient"));
        assert!(debug_str.contains("Idle"));
        client.destroy().await;
    }
}
