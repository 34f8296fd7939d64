//! convwatch - follow a remote conversion task over WebSocket.
//!
//! The server pushes a stream of named events describing a long-running
//! conversion job. This crate attaches to that stream, runs the connection
//! handshake, and fans decoded events out to registered listeners.
//!
//! # Architecture
//!
//! - **Channel** - owns the transport, runs the handshake, decodes frames and
//!   dispatches them to the listener registry
//! - **Events** - typed view over the open event vocabulary
//! - **Challenge** - answers mid-stream captcha challenges over the raw path
//! - **Monitor** - terminal presentation of log, progress and outcome
//!
//! # Modules
//!
//! - [`channel`] - frame codec, listener registry, event channel
//! - [`ws`] - WebSocket transport
//! - [`events`] - `ConverterEvent` vocabulary
//! - [`challenge`] - captcha responder
//! - [`monitor`] - progress output
//! - [`config`] - configuration loading/saving

pub mod challenge;
pub mod channel;
pub mod config;
pub mod constants;
pub mod events;
pub mod monitor;
pub mod ws;

// Re-export commonly used types
pub use channel::{
    ChannelError, ChannelSender, ConnectionState, EventChannel, Frame, FrameError,
    HandshakeVariant, ListenerId, ListenerRegistry, Ticket,
};
pub use config::Config;
pub use events::ConverterEvent;
pub use monitor::{Monitor, Outcome};
