#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the room client integration tests.
//!
//! Provides a channel-backed [`MockTransport`] driven through a
//! [`MockServer`] handle, a [`MockConnector`] that hands out scripted
//! sockets, and helpers that build server frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use piano_room_client::{Connector, SessionError, SessionEvent, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;

type Scripted = Option<Result<String, SessionError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-based mock transport.
///
/// Frames pushed through the paired [`MockServer`] are yielded by `recv()`
/// in order; a pushed `None` is a clean close. Everything the client sends
/// is recorded.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Scripted>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// The server side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockServer {
    tx: mpsc::UnboundedSender<Scripted>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

/// Create a connected transport/server pair.
pub fn mock_socket() -> (MockTransport, MockServer) {
    let (tx, incoming) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let transport = MockTransport {
        incoming,
        sent: Arc::clone(&sent),
        closed: Arc::clone(&closed),
    };
    (transport, MockServer { tx, sent, closed })
}

impl MockServer {
    /// Deliver one frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.tx.send(Some(Ok(frame.into())));
    }

    /// Fail the next `recv()` with a transport error.
    pub fn fail(&self, reason: &str) {
        let _ = self
            .tx
            .send(Some(Err(SessionError::TransportReceive(reason.into()))));
    }

    /// Close the socket from the server side.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Every message object the client sent, flattened out of its frames.
    pub fn sent_messages(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .flat_map(|frame| {
                let value: Value = serde_json::from_str(frame).expect("client frames are JSON");
                value.as_array().cloned().expect("client frames are arrays")
            })
            .collect()
    }

    /// The opcodes of [`sent_messages`](Self::sent_messages), in order.
    pub fn sent_opcodes(&self) -> Vec<String> {
        self.sent_messages()
            .iter()
            .map(|m| m["m"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Sent messages with the given opcode.
    pub fn sent_with(&self, opcode: &str) -> Vec<Value> {
        self.sent_messages()
            .into_iter()
            .filter(|m| m["m"] == opcode)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::TransportClosed);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Server handle dropped: keep the socket open until the client
            // closes it.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out scripted connection results in order. Once the script runs out
/// every attempt fails with a connection error.
#[derive(Clone)]
pub struct MockConnector {
    script: Arc<StdMutex<VecDeque<Result<MockTransport, SessionError>>>>,
    pub opens: Arc<AtomicUsize>,
    pub endpoints: Arc<StdMutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(script: Vec<Result<MockTransport, SessionError>>) -> Self {
        Self {
            script: Arc::new(StdMutex::new(script.into())),
            opens: Arc::new(AtomicUsize::new(0)),
            endpoints: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// A connector that opens exactly one socket.
    pub fn single() -> (Self, MockServer) {
        let (transport, server) = mock_socket();
        (Self::new(vec![Ok(transport)]), server)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, SessionError> {
        self.opens.fetch_add(1, Ordering::AcqRel);
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(e)) => Err(e),
            None => Err(SessionError::ConnectionFailure("connection refused".into())),
        }
    }
}

// ── Event helpers ───────────────────────────────────────────────────

/// Receive events until one matches `pred`, returning it. Everything before
/// it is returned too, for ordering assertions.
pub async fn recv_until(
    events: &mut mpsc::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> (SessionEvent, Vec<SessionEvent>) {
    let mut skipped = Vec::new();
    loop {
        let event = events.recv().await.expect("event channel closed early");
        if pred(&event) {
            return (event, skipped);
        }
        skipped.push(event);
    }
}

/// Receive events up to and including [`SessionEvent::Ready`].
pub async fn recv_until_ready(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    recv_until(events, |e| matches!(e, SessionEvent::Ready)).await.1
}

// ── Frame helpers ───────────────────────────────────────────────────

fn frame(messages: Vec<Value>) -> String {
    Value::Array(messages).to_string()
}

/// Handshake acknowledgement, optionally with a server time.
pub fn hello_json(server_time: Option<f64>) -> String {
    let mut msg = json!({ "m": "hi", "u": { "_id": "self", "name": "Tester" } });
    if let Some(t) = server_time {
        msg["t"] = json!(t);
    }
    frame(vec![msg])
}

/// Room snapshot listing `(id, name)` participants.
pub fn room_json(room: &str, people: &[(&str, &str)]) -> String {
    frame(vec![room_msg(room, people)])
}

pub fn room_msg(room: &str, people: &[(&str, &str)]) -> Value {
    let ppl: Vec<Value> = people
        .iter()
        .map(|(id, name)| json!({ "_id": id, "name": name }))
        .collect();
    json!({ "m": "ch", "ch": { "_id": room }, "ppl": ppl })
}

pub fn chat_msg(text: &str, author_id: &str) -> Value {
    json!({ "m": "a", "a": text, "p": { "_id": author_id } })
}

pub fn chat_json(text: &str, author_id: &str) -> String {
    frame(vec![chat_msg(text, author_id)])
}

pub fn join_json(id: &str, name: &str) -> String {
    frame(vec![json!({ "m": "p", "_id": id, "name": name })])
}

pub fn bye_json(id: &str) -> String {
    frame(vec![json!({ "m": "bye", "p": id })])
}

pub fn time_json(server_time: f64, echoed: Option<f64>) -> String {
    let mut msg = json!({ "m": "t", "t": server_time });
    if let Some(e) = echoed {
        msg["e"] = json!(e);
    }
    frame(vec![msg])
}

pub fn note_msg() -> Value {
    json!({ "m": "n", "t": 1000, "n": [{ "n": "a1", "v": 0.5 }], "p": "p1" })
}

/// Several messages batched in one frame.
pub fn batch(messages: Vec<Value>) -> String {
    frame(messages)
}
