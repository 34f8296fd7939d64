//! Event channel over a single bidirectional socket.
//!
//! # Architecture
//!
//! ```text
//! EventChannel
//!     ├── Transport (ws.rs; WebSocket in production)
//!     ├── Handshake (ticket push | user_ready frame)
//!     ├── Frame codec (frame.rs)
//!     └── ListenerRegistry (registry.rs)
//! ```
//!
//! # Handshake variants
//!
//! - **Ready** - the ticket is part of the connection target. On open the
//!   client sends `["user_ready"]`; afterwards `emit` sends frames.
//! - **Ticket push** - on open the client sends the bare ticket string.
//!   Inbound frames are dispatched as usual, but `emit` only notifies local
//!   listeners.
//!
//! In both variants `send_raw` writes an unframed string on the same
//! connection; it is the reply path for captcha challenges.
//!
//! # Usage
//!
//! ```ignore
//! let mut channel = EventChannel::ready("wss://conv.example.com/ws/inter/{ticket}", "42")?;
//! channel.on("progress", |args| { println!("{args:?}"); Ok(()) });
//! channel.connect().await?;
//! channel.run().await?;
//! ```

pub mod event_channel;
pub mod frame;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

pub use event_channel::{ChannelSender, EventChannel, EventChannelBuilder};
pub use frame::{Frame, FrameError, NO_ARGS};
pub use registry::{Listener, ListenerId, ListenerRegistry};

/// Lifecycle of a channel. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Constructed, `connect()` not yet called.
    #[default]
    Idle,
    /// Transport is being opened.
    Connecting,
    /// Transport is open, handshake message being sent.
    Handshaking,
    /// Handshake sent; frames are dispatched and sends are accepted.
    Open,
    /// Transport closed or failed. A new channel is needed to retry.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which connection-establishment protocol a channel speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandshakeVariant {
    /// Ticket sent as the first (raw) message; `emit` is local-only.
    TicketPush,
    /// Ticket embedded in the target; `["user_ready"]` sent on open.
    #[default]
    Ready,
}

impl std::fmt::Display for HandshakeVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TicketPush => f.write_str("ticket-push"),
            Self::Ready => f.write_str("ready"),
        }
    }
}

impl std::str::FromStr for HandshakeVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ready" => Ok(Self::Ready),
            "ticket-push" | "ticket_push" | "push" => Ok(Self::TicketPush),
            other => Err(format!(
                "unknown handshake variant '{other}' (expected 'ready' or 'ticket-push')"
            )),
        }
    }
}

/// Opaque pre-issued token presented once at channel start.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Ticket(String);

impl Ticket {
    /// Wrap a ticket string. Empty tickets are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, ChannelError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ChannelError::InvalidConfig("ticket is empty".to_string()));
        }
        Ok(Self(value))
    }

    /// The raw ticket value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check the ticket can stand in as a single URL path segment.
    pub(crate) fn check_path_segment(&self) -> Result<(), ChannelError> {
        if self
            .0
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace() || c.is_control())
        {
            return Err(ChannelError::InvalidConfig(
                "ticket cannot be embedded in a URL path segment".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Ticket(<redacted>)")
    }
}

/// Errors that can occur during channel operations.
#[derive(Debug)]
pub enum ChannelError {
    /// Channel construction parameters are unusable.
    InvalidConfig(String),
    /// Operation is not valid in the current state (e.g. `connect` twice).
    InvalidState(ConnectionState),
    /// Transport could not be opened or the handshake could not be sent.
    ConnectFailed(String),
    /// Send attempted before the handshake completed.
    NotOpen(ConnectionState),
    /// Channel was closed.
    Closed,
    /// Outbound event could not be encoded; nothing was sent.
    Encode(FrameError),
    /// Outbound queue rejected the message.
    SendFailed(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "Invalid channel configuration: {msg}"),
            Self::InvalidState(state) => write!(f, "Invalid in state '{state}'"),
            Self::ConnectFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::NotOpen(state) => write!(f, "Channel not open (state '{state}')"),
            Self::Closed => write!(f, "Channel closed"),
            Self::Encode(e) => write!(f, "Encode failed: {e}"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FrameError> for ChannelError {
    fn from(e: FrameError) -> Self {
        Self::Encode(e)
    }
}

/// Connection state observable from sender handles and listeners.
#[derive(Debug, Default)]
pub struct SharedConnectionState {
    state: RwLock<ConnectionState>,
}

impl SharedConnectionState {
    /// Create new shared state (`Idle`).
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub fn get(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the state. Once `Closed`, the state never changes again.
    pub fn set(&self, new_state: ConnectionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != ConnectionState::Closed {
            *state = new_state;
        }
    }

    /// Check if open.
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }
}
