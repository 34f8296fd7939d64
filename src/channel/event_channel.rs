//! `EventChannel`: connection lifecycle, handshake and dispatch loop.
//!
//! The channel exclusively owns its transport connection and its listener
//! registry. Everything runs on one dispatch loop ([`EventChannel::run`]):
//! an inbound message is decoded and all of its listeners return before the
//! next message is read. Listeners and other tasks talk back through a
//! cloneable [`ChannelSender`], whose sends are non-blocking queue pushes
//! drained by the same loop.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::constants::{EVENT_USER_READY, TICKET_PLACEHOLDER};
use crate::ws::{self, Transport, TransportReader, TransportWriter, WebSocketTransport, WsMessage};

use super::frame::{self, Frame, FrameError};
use super::registry::{Listener, ListenerId, ListenerRegistry};
use super::{ChannelError, ConnectionState, HandshakeVariant, SharedConnectionState, Ticket};

type DecodeErrorHook = dyn Fn(&FrameError, &str) + Send + Sync;

/// Work queued for the dispatch loop.
#[derive(Debug)]
enum Outbound {
    /// Write this text to the transport as-is.
    Text(String),
    /// Dispatch to local listeners (ticket-push `emit`).
    Local(Frame),
    /// Send a close frame and stop.
    Close,
}

/// Open transport halves, owned by whoever is driving the connection.
struct Connection {
    writer: Box<dyn TransportWriter>,
    reader: Box<dyn TransportReader>,
}

/// Cloneable handle for sending through a channel.
///
/// Safe to use from inside listeners and from other tasks.
#[derive(Clone, Debug)]
pub struct ChannelSender {
    handshake: HandshakeVariant,
    state: Arc<SharedConnectionState>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelSender {
    /// Emit an application event.
    ///
    /// Ready variant: encodes a frame and queues it for the transport.
    /// Ticket-push variant: queues a local dispatch to registered listeners;
    /// nothing is sent to the transport.
    ///
    /// # Errors
    ///
    /// `Encode` if `args` is not a JSON-representable sequence (nothing is
    /// queued), `NotOpen`/`Closed` if the ready variant is not open, `Closed`
    /// once a ticket-push channel has closed.
    pub fn emit<A: Serialize>(&self, event: &str, args: A) -> Result<(), ChannelError> {
        self.emit_frame(Frame::from_serialize(event, args)?)
    }

    /// Emit an already-built frame. See [`ChannelSender::emit`].
    pub fn emit_frame(&self, frame: Frame) -> Result<(), ChannelError> {
        match self.handshake {
            HandshakeVariant::TicketPush => {
                if self.state.get() == ConnectionState::Closed {
                    return Err(ChannelError::Closed);
                }
                self.push(Outbound::Local(frame))
            }
            HandshakeVariant::Ready => {
                let text = frame.encode()?;
                self.ensure_open()?;
                self.push(Outbound::Text(text))
            }
        }
    }

    /// Send `text` unframed on the same connection.
    ///
    /// This is the captcha answer path: the payload is exactly `text`.
    pub fn send_raw(&self, text: &str) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.push(Outbound::Text(text.to_string()))
    }

    /// Ask the dispatch loop to close the connection.
    pub fn close(&self) -> Result<(), ChannelError> {
        if self.state.get() == ConnectionState::Closed {
            return Ok(());
        }
        self.push(Outbound::Close)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Handshake variant of the owning channel.
    #[must_use]
    pub fn handshake(&self) -> HandshakeVariant {
        self.handshake
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        match self.state.get() {
            ConnectionState::Open => Ok(()),
            ConnectionState::Closed => Err(ChannelError::Closed),
            other => Err(ChannelError::NotOpen(other)),
        }
    }

    fn push(&self, msg: Outbound) -> Result<(), ChannelError> {
        self.tx
            .send(msg)
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }
}

/// Builder for `EventChannel`.
#[derive(Default)]
pub struct EventChannelBuilder {
    url: Option<String>,
    ticket: Option<String>,
    handshake: HandshakeVariant,
    transport: Option<Box<dyn Transport>>,
}

impl std::fmt::Debug for EventChannelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannelBuilder")
            .field("url", &self.url)
            .field("handshake", &self.handshake)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl EventChannelBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection URL (required). `http(s)://` is rewritten to `ws(s)://`.
    ///
    /// For the ready variant the URL may contain `{ticket}`; otherwise the
    /// ticket is appended as the last path segment.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the ticket (required).
    #[must_use]
    pub fn ticket(mut self, ticket: impl Into<String>) -> Self {
        self.ticket = Some(ticket.into());
        self
    }

    /// Choose the handshake variant (default: ready).
    #[must_use]
    pub fn handshake(mut self, variant: HandshakeVariant) -> Self {
        self.handshake = variant;
        self
    }

    /// Use a custom transport instead of WebSocket.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Build the channel.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the URL or ticket is missing or the ticket cannot
    /// be embedded in the ready-variant target.
    pub fn build(self) -> Result<EventChannel, ChannelError> {
        let url = self
            .url
            .ok_or_else(|| ChannelError::InvalidConfig("url is required".to_string()))?;
        let ticket = Ticket::new(
            self.ticket
                .ok_or_else(|| ChannelError::InvalidConfig("ticket is required".to_string()))?,
        )?;
        let url = ws::http_to_ws_scheme(&url);

        let (target, ticket) = match self.handshake {
            HandshakeVariant::Ready => {
                ticket.check_path_segment()?;
                (embed_ticket(&url, ticket.expose()), None)
            }
            HandshakeVariant::TicketPush => (url.clone(), Some(ticket)),
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Ok(EventChannel {
            url,
            target,
            handshake: self.handshake,
            ticket,
            transport: self
                .transport
                .unwrap_or_else(|| Box::new(WebSocketTransport::new())),
            registry: ListenerRegistry::new(),
            state: SharedConnectionState::new(),
            outbound_tx,
            outbound_rx,
            connection: None,
            decode_error_hook: None,
            decode_failures: 0,
        })
    }
}

/// Put the ticket into a ready-variant target URL.
fn embed_ticket(url: &str, ticket: &str) -> String {
    if url.contains(TICKET_PLACEHOLDER) {
        url.replacen(TICKET_PLACEHOLDER, ticket, 1)
    } else {
        format!("{}/{}", url.trim_end_matches('/'), ticket)
    }
}

/// One server-pushed event stream.
pub struct EventChannel {
    /// URL as configured, without the ticket. Safe to log.
    url: String,
    /// Connection target handed to the transport.
    target: String,
    handshake: HandshakeVariant,
    /// Ticket-push variant only; taken when the handshake is sent.
    ticket: Option<Ticket>,
    transport: Box<dyn Transport>,
    registry: ListenerRegistry,
    state: Arc<SharedConnectionState>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    /// Present between a successful `connect` and the start of `run`.
    connection: Option<Connection>,
    decode_error_hook: Option<Box<DecodeErrorHook>>,
    decode_failures: u64,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("url", &self.url)
            .field("handshake", &self.handshake)
            .field("state", &self.state.get())
            .field("registry", &self.registry)
            .field("decode_failures", &self.decode_failures)
            .finish_non_exhaustive()
    }
}

impl EventChannel {
    /// Create a new channel builder.
    #[must_use]
    pub fn builder() -> EventChannelBuilder {
        EventChannelBuilder::new()
    }

    /// Ready-handshake channel over WebSocket.
    pub fn ready(url: &str, ticket: &str) -> Result<Self, ChannelError> {
        Self::builder()
            .url(url)
            .ticket(ticket)
            .handshake(HandshakeVariant::Ready)
            .build()
    }

    /// Ticket-push channel over WebSocket.
    pub fn ticket_push(url: &str, ticket: &str) -> Result<Self, ChannelError> {
        Self::builder()
            .url(url)
            .ticket(ticket)
            .handshake(HandshakeVariant::TicketPush)
            .build()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Shared connection state for external observation.
    #[must_use]
    pub fn shared_state(&self) -> Arc<SharedConnectionState> {
        Arc::clone(&self.state)
    }

    /// Handshake variant chosen at construction.
    #[must_use]
    pub fn handshake(&self) -> HandshakeVariant {
        self.handshake
    }

    /// Configured URL (ticket not included).
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of inbound messages dropped because they failed to decode.
    #[must_use]
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    /// Read access to the listener registry.
    #[must_use]
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Get a cloneable sender handle for this channel.
    #[must_use]
    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            handshake: self.handshake,
            state: Arc::clone(&self.state),
            tx: self.outbound_tx.clone(),
        }
    }

    /// Register a listener for `event`. See [`ListenerRegistry::on`].
    pub fn on<F>(&mut self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&[serde_json::Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.on(event, callback)
    }

    /// Register an existing listener handle for `event`.
    pub fn on_listener(&mut self, event: &str, listener: Listener) -> ListenerId {
        self.registry.on_listener(event, listener)
    }

    /// Register an observer for every dispatched frame.
    pub fn on_any<F>(&mut self, callback: F) -> ListenerId
    where
        F: Fn(&Frame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.on_any(callback)
    }

    /// Remove a registration.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.registry.off(id)
    }

    /// Be told about inbound messages that failed to decode.
    ///
    /// The hook receives the error and the raw message. It replaces any
    /// previously set hook.
    pub fn on_decode_error<F>(&mut self, hook: F)
    where
        F: Fn(&FrameError, &str) + Send + Sync + 'static,
    {
        self.decode_error_hook = Some(Box::new(hook));
    }

    /// Emit an application event.
    ///
    /// Ticket-push variant: invokes the local listeners synchronously before
    /// returning, and fails with `Closed` once the channel is closed. Ready
    /// variant: queues an encoded frame for the transport (see
    /// [`ChannelSender::emit`]).
    pub fn emit<A: Serialize>(&mut self, event: &str, args: A) -> Result<(), ChannelError> {
        let frame = Frame::from_serialize(event, args)?;
        match self.handshake {
            HandshakeVariant::TicketPush => {
                if self.state.get() == ConnectionState::Closed {
                    return Err(ChannelError::Closed);
                }
                self.registry.dispatch(&frame);
                Ok(())
            }
            HandshakeVariant::Ready => self.sender().emit_frame(frame),
        }
    }

    /// Send `text` unframed. See [`ChannelSender::send_raw`].
    pub fn send_raw(&self, text: &str) -> Result<(), ChannelError> {
        self.sender().send_raw(text)
    }

    /// Open the transport and send the handshake.
    ///
    /// Valid only once, from `Idle`. On failure the channel is `Closed`.
    pub async fn connect(&mut self) -> Result<(), ChannelError> {
        let current = self.state.get();
        if current != ConnectionState::Idle {
            return Err(ChannelError::InvalidState(current));
        }

        self.state.set(ConnectionState::Connecting);
        log::info!("Connecting to {} ({} handshake)", self.url, self.handshake);

        let (mut writer, reader) = match self.transport.open(&self.target).await {
            Ok(halves) => halves,
            Err(e) => {
                log::warn!("Failed to connect to {}: {:#}", self.url, e);
                self.mark_closed();
                return Err(ChannelError::ConnectFailed(format!("{e:#}")));
            }
        };

        self.state.set(ConnectionState::Handshaking);
        let handshake = match self.handshake_message() {
            Ok(text) => text,
            Err(e) => {
                self.mark_closed();
                return Err(e);
            }
        };

        if let Err(e) = writer.send_text(&handshake).await {
            log::warn!("Handshake send failed: {:#}", e);
            self.mark_closed();
            return Err(ChannelError::ConnectFailed(format!("handshake failed: {e:#}")));
        }

        self.connection = Some(Connection { writer, reader });
        self.state.set(ConnectionState::Open);
        log::info!("Channel open on {}", self.url);
        Ok(())
    }

    /// The single first outbound message for this channel's variant.
    fn handshake_message(&mut self) -> Result<String, ChannelError> {
        match self.handshake {
            HandshakeVariant::TicketPush => self
                .ticket
                .take()
                .map(Ticket::into_inner)
                .ok_or_else(|| ChannelError::InvalidConfig("ticket already consumed".to_string())),
            HandshakeVariant::Ready => Ok(frame::encode(EVENT_USER_READY, frame::NO_ARGS)?),
        }
    }

    /// Drive the connection until the transport closes.
    ///
    /// Queued outbound work is handled before the next inbound message is
    /// read, in FIFO order. Returns `Ok(())` once the channel is `Closed`.
    ///
    /// # Errors
    ///
    /// `NotOpen` if `connect` has not succeeded (or `run` already ran).
    pub async fn run(&mut self) -> Result<(), ChannelError> {
        let Some(mut conn) = self.connection.take() else {
            return Err(ChannelError::NotOpen(self.state.get()));
        };

        loop {
            tokio::select! {
                biased;

                Some(outbound) = self.outbound_rx.recv() => {
                    match outbound {
                        Outbound::Text(text) => {
                            if let Err(e) = conn.writer.send_text(&text).await {
                                log::warn!("Send failed, closing channel: {:#}", e);
                                break;
                            }
                        }
                        Outbound::Local(frame) => {
                            self.registry.dispatch(&frame);
                        }
                        Outbound::Close => {
                            if let Err(e) = conn.writer.send_close().await {
                                log::debug!("Close frame not sent: {:#}", e);
                            }
                            log::info!("Channel closed by client");
                            break;
                        }
                    }
                }

                inbound = conn.reader.recv() => {
                    match inbound {
                        Some(Ok(WsMessage::Text(text))) => self.handle_message(&text),
                        Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                            Ok(text) => self.handle_message(&text),
                            Err(e) => self.report_decode_failure(
                                &FrameError::NotText,
                                &String::from_utf8_lossy(e.as_bytes()),
                            ),
                        },
                        Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                        Some(Ok(WsMessage::Close { code, reason })) => {
                            log::info!("Channel closed by server ({}): {}", code, reason);
                            break;
                        }
                        Some(Err(e)) => {
                            log::warn!("Transport error: {:#}", e);
                            break;
                        }
                        None => {
                            log::info!("Transport stream ended");
                            break;
                        }
                    }
                }
            }
        }

        self.mark_closed();
        Ok(())
    }

    /// Close the connection from the owning side.
    ///
    /// If the loop is running use [`ChannelSender::close`] instead.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            if let Err(e) = conn.writer.send_close().await {
                log::debug!("Close frame not sent: {:#}", e);
            }
        }
        self.mark_closed();
    }

    /// Decode one inbound message and fan it out.
    fn handle_message(&mut self, text: &str) {
        let state = self.state.get();
        if state != ConnectionState::Open {
            log::debug!("Ignoring inbound message while {}", state);
            return;
        }

        match Frame::decode(text) {
            Ok(frame) => {
                if !self.registry.has_listeners(&frame.name) {
                    log::debug!("No listeners for '{}'", frame.name);
                }
                self.registry.dispatch(&frame);
            }
            Err(e) => self.report_decode_failure(&e, text),
        }
    }

    fn report_decode_failure(&mut self, error: &FrameError, raw: &str) {
        self.decode_failures += 1;
        log::warn!("Dropping malformed frame: {}", error);
        if let Some(hook) = &self.decode_error_hook {
            hook(error, raw);
        }
    }

    /// Enter the terminal state and discard queued outbound work.
    fn mark_closed(&mut self) {
        self.state.set(ConnectionState::Closed);
        let mut dropped = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            log::debug!("Discarded {} queued outbound message(s)", dropped);
        }
    }
}
