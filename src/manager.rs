//! Connection lifecycle manager.
//!
//! The manager is the background task behind a [`RoomClient`]. It owns the
//! socket and is the only writer of the session state, so everything below
//! runs on one sequential `tokio::select!` loop:
//!
//! - commands from the client handle (connect, send, reconnect, destroy)
//! - completion of a pending socket open
//! - inbound frames from the open socket
//! - heartbeat, keep-alive and clock-smoothing ticks
//! - the delay before the next reconnection attempt
//! - room in the event channel for lifecycle events that did not fit
//!
//! Every timer is an `Option` that the loop only polls while it is `Some`;
//! cancelling a timer is setting it back to `None`.
//!
//! The loop never waits on the event channel while handling something else.
//! `Disconnected` and `Terminated` go into a backlog when the channel is
//! full and are delivered from their own branch, so a consumer that is
//! awaiting a command reply is never blocked behind its own unread events.
//!
//! [`RoomClient`]: crate::RoomClient

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::{local_time_ms, ClockSync};
use crate::codec;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::error_codes::ErrorCode;
use crate::event::{ChatMessage, SessionEvent};
use crate::lifecycle::LifecycleState;
use crate::protocol::{
    ClientMessage, Inbound, ParticipantId, RoomId, ServerMessage, UserSettings,
};
use crate::queue::{PendingItem, PendingQueue};
use crate::reconnect::{ReconnectDecision, ReconnectPolicy};
use crate::roster::Roster;
use crate::transport::{Connector, Transport};

/// What happened to an outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the socket.
    Sent,
    /// Held in the pending queue until the session is ready.
    Queued,
    /// Not sent: the session is not ready and the command cannot wait, the
    /// queue is full, or the socket failed while writing.
    Rejected,
}

/// Requests from the client handle to the manager task.
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Send {
        message: ClientMessage,
        reply: oneshot::Sender<SendOutcome>,
    },
    Reconnect {
        reply: oneshot::Sender<bool>,
    },
    MoveCursor {
        x: f64,
        y: f64,
    },
    Destroy,
}

/// State the manager writes and the client handle reads.
pub(crate) struct SessionShared {
    pub(crate) roster: Mutex<Roster>,
    pub(crate) clock: Mutex<ClockSync>,
    pub(crate) room: Mutex<Option<RoomId>>,
    pub(crate) username: Mutex<String>,
    pub(crate) participant_id: Mutex<Option<ParticipantId>>,
    pub(crate) ready_at: Mutex<Option<SystemTime>>,
    pub(crate) reconnect_attempts: AtomicU32,
}

impl SessionShared {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        Self {
            roster: Mutex::new(Roster::new()),
            clock: Mutex::new(ClockSync::new(
                config.clock_smoothing_steps,
                config.clock_smoothing_window,
            )),
            room: Mutex::new(None),
            username: Mutex::new(config.username.clone()),
            participant_id: Mutex::new(None),
            ready_at: Mutex::new(None),
            reconnect_attempts: AtomicU32::new(0),
        }
    }
}

type OpenFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

pub(crate) struct Manager {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<SessionShared>,
    state_tx: watch::Sender<LifecycleState>,
    event_tx: mpsc::Sender<SessionEvent>,

    transport: Option<Box<dyn Transport>>,
    /// Last endpoint handed to the connector; reconnection reuses it.
    endpoint: Option<String>,
    opening: Option<OpenFuture>,
    /// Reply for the `connect()` call whose open is in flight. `None` while
    /// a reconnection attempt is opening.
    connect_reply: Option<oneshot::Sender<Result<()>>>,

    heartbeat: Option<Interval>,
    keep_alive: Option<Interval>,
    smoothing: Option<Interval>,
    reconnect_at: Option<Instant>,
    teardown: Option<String>,

    policy: ReconnectPolicy,
    queue: PendingQueue,
    /// Critical events waiting for room in the event channel.
    backlog: VecDeque<SessionEvent>,
    /// Set when the session just became ready; the queue is drained once the
    /// message that caused it has been dispatched.
    ready_pending: bool,
    room: RoomId,
    cursor: (f64, f64),
}

impl Manager {
    pub(crate) fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        shared: Arc<SessionShared>,
        state_tx: watch::Sender<LifecycleState>,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let policy = ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_delay);
        let queue = PendingQueue::new(config.pending_queue_capacity);
        let room = config.room.clone();
        Self {
            config,
            connector,
            shared,
            state_tx,
            event_tx,
            transport: None,
            endpoint: None,
            opening: None,
            connect_reply: None,
            heartbeat: None,
            keep_alive: None,
            smoothing: None,
            reconnect_at: None,
            teardown: None,
            policy,
            queue,
            backlog: VecDeque::new(),
            ready_pending: false,
            room,
            cursor: (0.0, 0.0),
        }
    }

    fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Run until the session is terminated.
    pub(crate) async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        debug!("session manager started");
        let event_tx = self.event_tx.clone();

        loop {
            if let Some(reason) = self.teardown.take() {
                self.terminate(reason).await;
            }
            if self.state().is_terminal() {
                break;
            }

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        debug!("command channel closed, tearing down session");
                        self.terminate("client handle dropped".to_string()).await;
                    }
                },

                opened = await_open(&mut self.opening) => {
                    self.opening = None;
                    self.on_open(opened).await;
                }

                incoming = recv_frame(&mut self.transport) => match incoming {
                    Some(Ok(text)) => self.on_frame(&text).await,
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        self.on_socket_lost(Some(format!("transport receive error: {e}"))).await;
                    }
                    None => {
                        debug!("transport closed by server");
                        self.on_socket_lost(None).await;
                    }
                },

                _ = tick(&mut self.heartbeat) => {
                    let heartbeat = ClientMessage::Heartbeat { client_time: local_time_ms() };
                    self.transmit(&heartbeat).await;
                }

                _ = tick(&mut self.keep_alive) => {
                    let (x, y) = self.cursor;
                    self.transmit(&ClientMessage::Cursor { x, y }).await;
                }

                _ = tick(&mut self.smoothing) => {
                    if !self.shared.clock.lock().await.tick() {
                        self.smoothing = None;
                    }
                }

                _ = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.try_reconnect();
                }

                permit = event_tx.reserve(), if !self.backlog.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(event) = self.backlog.pop_front() {
                            permit.send(event);
                        }
                    }
                    Err(_) => {
                        debug!("event channel closed, receiver dropped");
                        self.backlog.clear();
                    }
                },
            }
        }

        // Refuse further commands before waiting on the consumer, so nobody
        // is left awaiting a reply while the last events are delivered.
        drop(cmd_rx);
        for event in std::mem::take(&mut self.backlog) {
            if self.event_tx.send(event).await.is_err() {
                debug!("event channel closed, receiver dropped");
                break;
            }
        }

        debug!("session manager exited");
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => self.connect(reply),
            Command::Send { message, reply } => {
                match &message {
                    ClientMessage::SetRoom { room } => self.room = room.clone(),
                    ClientMessage::SetUser { set } => {
                        *self.shared.username.lock().await = set.name.clone();
                    }
                    _ => {}
                }
                let outcome = self.submit(message).await;
                let _ = reply.send(outcome);
            }
            Command::Reconnect { reply } => {
                let started = self.try_reconnect();
                let _ = reply.send(started);
            }
            Command::MoveCursor { x, y } => self.cursor = (x, y),
            Command::Destroy => {
                self.terminate(ErrorCode::WsCloseRequested.message().to_string())
                    .await;
            }
        }
    }

    fn connect(&mut self, reply: oneshot::Sender<Result<()>>) {
        let state = self.state();
        if state.is_terminal() {
            let _ = reply.send(Err(SessionError::SessionDestroyed));
            return;
        }
        if !state.accepts_connect() {
            let _ = reply.send(Err(SessionError::InvalidState(format!(
                "{} (state {state})",
                ErrorCode::WsConnectionExists.message()
            ))));
            return;
        }

        let endpoint = match self.config.resolve_endpoint() {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        self.reconnect_at = None;
        self.transition(LifecycleState::Connecting);
        self.debug_event(format!("Preparing to connect to {endpoint}"));
        self.open(endpoint);
        self.connect_reply = Some(reply);
    }

    /// Start opening a socket; the result arrives in the select loop.
    fn open(&mut self, endpoint: String) {
        self.endpoint = Some(endpoint.clone());
        let connector = Arc::clone(&self.connector);
        self.opening = Some(Box::pin(async move { connector.connect(&endpoint).await }));
    }

    // ── Socket lifecycle ────────────────────────────────────────────

    async fn on_open(&mut self, opened: Result<Box<dyn Transport>>) {
        let reply = self.connect_reply.take();
        let reconnecting = reply.is_none();

        match opened {
            Ok(transport) => {
                info!(endpoint = ?self.endpoint, reconnecting, "socket opened");
                self.transport = Some(transport);
                if reconnecting {
                    self.policy.succeeded();
                    self.start_new_server_session().await;
                }
                self.transition(LifecycleState::Handshaking);
                self.start_tickers();

                let handshake = ClientMessage::Handshake {
                    token: self.config.auth_token.clone(),
                };
                self.transmit(&handshake).await;

                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Err(e) if !reconnecting => {
                warn!("connect failed: {e}");
                self.debug_event(format!("Couldn't connect: {e}"));
                let fatal = !e.is_retryable();
                let reason = e.to_string();
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
                if fatal {
                    self.terminate(reason).await;
                } else {
                    self.transition(LifecycleState::Disconnected);
                }
            }
            Err(e) => {
                warn!(attempt = self.policy.attempts(), "reconnect attempt failed: {e}");
                match self.policy.failed(&e) {
                    ReconnectDecision::RetryAfter(delay) => {
                        self.debug_event(format!(
                            "Couldn't reconnect: {e}. Retrying in {}s...",
                            delay.as_secs_f64()
                        ));
                        self.transition(LifecycleState::Disconnected);
                        self.reconnect_at = Some(Instant::now() + delay);
                    }
                    ReconnectDecision::GiveUp => {
                        self.transition(LifecycleState::Disconnected);
                        self.teardown = Some(ErrorCode::ReconnectExhausted.message().to_string());
                    }
                    ReconnectDecision::Fatal => {
                        self.terminate(e.to_string()).await;
                    }
                }
            }
        }
    }

    /// A reconnection reached a fresh server session: membership and clock
    /// from the old one no longer apply.
    async fn start_new_server_session(&mut self) {
        self.shared.roster.lock().await.clear();
        self.shared.clock.lock().await.reset();
        self.smoothing = None;
    }

    async fn on_socket_lost(&mut self, reason: Option<String>) {
        self.transport = None;
        self.stop_tickers();
        if !self.transition(LifecycleState::Disconnected) {
            return;
        }
        self.emit_critical(SessionEvent::Disconnected { reason });
        self.try_reconnect();
    }

    /// Start a reconnection attempt if the state allows one.
    ///
    /// Returns `false` without doing anything when not disconnected, when an
    /// attempt is already in flight, or when no attempts remain (in which
    /// case teardown is scheduled).
    fn try_reconnect(&mut self) -> bool {
        if self.state() != LifecycleState::Disconnected
            || self.opening.is_some()
            || self.policy.in_progress()
        {
            debug!(state = %self.state(), "reconnect ignored");
            return false;
        }
        let Some(endpoint) = self.endpoint.clone() else {
            debug!("reconnect ignored: never connected");
            return false;
        };
        if !self.policy.begin() {
            self.teardown = Some(ErrorCode::ReconnectExhausted.message().to_string());
            return false;
        }

        let attempt = self.policy.attempts();
        self.shared
            .reconnect_attempts
            .store(attempt, Ordering::Release);
        self.reconnect_at = None;
        self.transition(LifecycleState::Reconnecting);
        self.debug_event(format!(
            "Reconnecting to {endpoint} (attempt {attempt}/{})",
            self.policy.max_attempts()
        ));
        self.open(endpoint);
        true
    }

    async fn terminate(&mut self, reason: String) {
        if self.state().is_terminal() {
            return;
        }
        info!(%reason, "terminating session");

        self.opening = None;
        if let Some(reply) = self.connect_reply.take() {
            let _ = reply.send(Err(SessionError::SessionDestroyed));
        }
        self.reconnect_at = None;
        self.teardown = None;
        self.stop_tickers();
        self.smoothing = None;
        self.shared.clock.lock().await.cancel();

        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("error closing transport: {e}");
            }
        }

        let dropped = self.queue.len();
        if dropped > 0 {
            warn!(dropped, "discarding pending messages");
        }
        self.queue.clear();

        self.transition(LifecycleState::Terminated);
        self.emit_critical(SessionEvent::Terminated { reason });
    }

    fn start_tickers(&mut self) {
        self.heartbeat = Some(ticker(self.config.heartbeat_interval));
        self.keep_alive = self.config.keep_alive_interval.map(ticker);
    }

    fn stop_tickers(&mut self) {
        self.heartbeat = None;
        self.keep_alive = None;
    }

    // ── Inbound ─────────────────────────────────────────────────────

    async fn on_frame(&mut self, text: &str) {
        let decoded = match codec::decode_frame(text) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.report_violation(&e);
                return;
            }
        };

        for item in decoded {
            match item {
                Ok(inbound) => self.process_inbound(inbound).await,
                Err(e) => self.report_violation(&e),
            }
            if std::mem::take(&mut self.ready_pending) {
                self.drain_queue().await;
                // A drained write can lose the socket.
                if self.state() == LifecycleState::Ready {
                    self.emit(SessionEvent::Ready);
                }
            }
        }
    }

    async fn process_inbound(&mut self, inbound: Inbound) {
        if self.state() != LifecycleState::Ready && !inbound.bypasses_queue() {
            debug!(opcode = inbound.opcode(), "queueing inbound message until ready");
            if self.queue.push(PendingItem::Inbound(inbound)).is_err() {
                warn!("{}", ErrorCode::QueueFull.message());
                self.debug_event(ErrorCode::QueueFull.message());
            }
            return;
        }
        self.dispatch(inbound).await;
    }

    async fn dispatch(&mut self, inbound: Inbound) {
        let msg = match inbound {
            Inbound::Message(msg) => msg,
            Inbound::Other { opcode, payload } => {
                self.emit(SessionEvent::Opcode { opcode, payload });
                return;
            }
        };

        match msg {
            ServerMessage::Hello { server_time, user } => {
                if let Some(server_time) = server_time {
                    self.clock_sample(server_time, None).await;
                }
                if let Some(user) = user {
                    debug!(id = %user.id, name = %user.name, "server assigned identity");
                    *self.shared.participant_id.lock().await = Some(user.id);
                }
                if self.state() == LifecycleState::Handshaking {
                    let join = ClientMessage::SetRoom {
                        room: self.room.clone(),
                    };
                    let name = ClientMessage::SetUser {
                        set: UserSettings {
                            name: self.shared.username.lock().await.clone(),
                        },
                    };
                    let superseded = self.queue.discard_outbound(ClientMessage::is_queueable);
                    if superseded > 0 {
                        debug!(superseded, "handshake carries the queued room and name");
                    }
                    self.transmit(&join).await;
                    self.transmit(&name).await;
                } else {
                    self.debug_event("Ignoring handshake acknowledgement outside of handshake");
                }
            }
            ServerMessage::TimeSync {
                server_time,
                echoed_time,
            } => {
                self.clock_sample(server_time, echoed_time).await;
            }
            ServerMessage::RoomSnapshot { room, participants } => {
                let applied = self.shared.roster.lock().await.apply_snapshot(participants);
                let room = room.map(|r| r.id);
                if let Some(id) = &room {
                    *self.shared.room.lock().await = Some(id.clone());
                }
                self.emit(SessionEvent::RoomSnapshot {
                    room,
                    participants: applied,
                });
                self.mark_ready().await;
            }
            ServerMessage::Chat { text, author } => {
                let author = self.shared.roster.lock().await.resolve_author(author);
                if !author.is_known() {
                    debug!(author = author.id(), "chat from participant not in roster");
                }
                self.emit(SessionEvent::ChatReceived(ChatMessage {
                    content: text,
                    author,
                }));
            }
            ServerMessage::ParticipantJoin(info) => {
                let is_self =
                    self.shared.participant_id.lock().await.as_deref() == Some(info.id.as_str());
                if is_self {
                    *self.shared.username.lock().await = info.name.clone();
                }
                let event = self.shared.roster.lock().await.join(info);
                self.emit(event);
            }
            ServerMessage::ParticipantLeave { id } => {
                let event = self.shared.roster.lock().await.leave(&id);
                self.emit(event);
            }
        }
    }

    async fn clock_sample(&mut self, server_time: f64, echoed_time: Option<f64>) {
        let mut clock = self.shared.clock.lock().await;
        clock.sample(server_time, echoed_time, local_time_ms());
        if clock.is_smoothing() {
            self.smoothing = Some(ticker(clock.tick_interval()));
        }
    }

    async fn mark_ready(&mut self) {
        match self.state() {
            LifecycleState::Handshaking => {
                self.transition(LifecycleState::Ready);
                *self.shared.ready_at.lock().await = Some(SystemTime::now());
                self.policy.reset();
                self.shared.reconnect_attempts.store(0, Ordering::Release);
                self.ready_pending = true;
            }
            LifecycleState::Ready => {
                self.debug_event("Room snapshot received while already ready");
            }
            other => {
                warn!(state = %other, "room snapshot outside of handshake");
            }
        }
    }

    async fn drain_queue(&mut self) {
        let batch = self.queue.drain();
        if batch.is_empty() {
            return;
        }
        debug!(count = batch.len(), "draining pending queue");
        for item in batch {
            match item {
                PendingItem::Inbound(inbound) => self.process_inbound(inbound).await,
                PendingItem::Outbound(message) => {
                    self.submit(message).await;
                }
            }
        }
    }

    fn report_violation(&self, error: &SessionError) {
        warn!("dropping inbound message: {error}");
        self.debug_event(error.to_string());
    }

    // ── Outbound ────────────────────────────────────────────────────

    async fn submit(&mut self, message: ClientMessage) -> SendOutcome {
        let state = self.state();
        if state == LifecycleState::Ready {
            return if self.transmit(&message).await {
                SendOutcome::Sent
            } else {
                SendOutcome::Rejected
            };
        }

        if message.is_queueable() && !state.is_terminal() {
            return match self.queue.push(PendingItem::Outbound(message)) {
                Ok(()) => SendOutcome::Queued,
                Err(_) => {
                    warn!("{}", ErrorCode::QueueFull.message());
                    SendOutcome::Rejected
                }
            };
        }

        self.debug_event(format!(
            "{} Session is {state}.",
            ErrorCode::WsNotOpen.render(&[message.opcode()])
        ));
        SendOutcome::Rejected
    }

    /// Write one command to the open socket. A write failure counts as the
    /// socket being lost.
    async fn transmit(&mut self, message: &ClientMessage) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        let frame = match codec::encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to encode {}: {e}", message.opcode());
                return false;
            }
        };

        let written = transport.send(frame).await;
        match written {
            Ok(()) => {
                debug!(opcode = message.opcode(), "sent");
                true
            }
            Err(e) => {
                error!("transport send error: {e}");
                self.on_socket_lost(Some(format!("transport send error: {e}")))
                    .await;
                false
            }
        }
    }

    // ── State and events ────────────────────────────────────────────

    /// Move to `next`, reporting illegal moves instead of making them.
    fn transition(&mut self, next: LifecycleState) -> bool {
        let from = self.state();
        if !from.can_transition_to(next) {
            warn!(%from, to = %next, "illegal lifecycle transition refused");
            return false;
        }
        self.state_tx.send_replace(next);
        debug!(%from, to = %next, "lifecycle transition");
        self.emit(SessionEvent::StateChanged { from, to: next });
        true
    }

    fn debug_event(&self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        self.emit(SessionEvent::Debug(message));
    }

    /// Emit without waiting. If the channel is full, or lifecycle events are
    /// still waiting for room, the event is dropped.
    fn emit(&self, event: SessionEvent) {
        if !self.backlog.is_empty() {
            warn!(
                "event channel congested, dropping event: {:?}",
                std::mem::discriminant(&event)
            );
            return;
        }
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit an event that must not be dropped. When the channel is full it
    /// waits in the backlog, behind any earlier ones.
    fn emit_critical(&mut self, event: SessionEvent) {
        debug_assert!(event.is_critical());
        if !self.backlog.is_empty() {
            self.backlog.push_back(event);
            return;
        }
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("event channel full, holding lifecycle event until there is room");
                self.backlog.push_back(event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn await_open(opening: &mut Option<OpenFuture>) -> Result<Box<dyn Transport>> {
    match opening {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn recv_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
