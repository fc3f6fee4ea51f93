//! Session lifecycle states and their legal transitions.

use std::fmt;

/// Where a session is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    /// Created, never connected.
    #[default]
    Idle,
    /// Opening the socket.
    Connecting,
    /// Socket open, waiting for the handshake and first room snapshot.
    Handshaking,
    /// Fully joined; traffic flows without queueing.
    Ready,
    /// Socket lost; reconnection may follow.
    Disconnected,
    /// A reconnection attempt is opening a new socket.
    Reconnecting,
    /// Finished for good.
    Terminated,
}

impl LifecycleState {
    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Idle, Connecting) => true,
            (Connecting, Handshaking | Disconnected) => true,
            (Handshaking, Ready | Disconnected) => true,
            (Ready, Disconnected) => true,
            (Disconnected, Connecting | Reconnecting) => true,
            (Reconnecting, Handshaking | Disconnected) => true,
            _ => false,
        }
    }

    /// `connect()` is only accepted from these states.
    pub fn accepts_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected)
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Handshaking => write!(f, "HANDSHAKING"),
            Self::Ready => write!(f, "READY"),
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Reconnecting => write!(f, "RECONNECTING"),
            Self::Terminated => write!(f, "TERMINATED"),
        }
    }
}
