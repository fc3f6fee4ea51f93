//! Transport abstraction for room sessions.
//!
//! The [`Transport`] trait is a bidirectional text channel: one call to
//! [`send`](Transport::send) writes one complete frame and one call to
//! [`recv`](Transport::recv) yields one complete frame. Framing (WebSocket
//! frames, length prefixes, ...) is the implementation's business.
//!
//! Because the session reconnects on its own, it also needs a way to open
//! fresh transports. That is the [`Connector`] trait: given an endpoint it
//! produces a connected transport, or says why it could not.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use piano_room_client::error::SessionError;
//! use piano_room_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), SessionError> {
//!         // Write the JSON frame to the socket
//!         # let _ = frame;
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         // Return None when the connection is closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, SessionError> {
//!         # let _ = endpoint;
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SessionError;

/// A bidirectional text frame transport.
///
/// # Object Safety
///
/// The session stores transports as `Box<dyn Transport>`, so the trait must
/// stay object-safe.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling
/// it again must not lose data. Channel-based implementations are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] or
    /// [`SessionError::TransportClosed`] if the frame could not be written.
    async fn send(&mut self, frame: String) -> Result<(), SessionError>;

    /// Receive the next text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly by the server
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the connection gracefully.
    ///
    /// Implementations should release resources even if the close handshake
    /// fails, and a second call should be a no-op.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens transports to a gateway endpoint.
///
/// Called once for [`connect`](crate::RoomClient::connect) and once per
/// reconnection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connected transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Return [`SessionError::AuthorizationFailure`] when the gateway refused
    /// the credentials; this stops reconnection. Any other error is treated
    /// as a retryable connection failure.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, SessionError>;
}
