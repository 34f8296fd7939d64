//! Socket transport for the event channel.
//!
//! The channel opens connections through [`Transport`] and then owns the
//! two halves it gets back: a [`TransportWriter`] for the handshake, frames
//! and raw answers, and a [`TransportReader`] polled by the dispatch loop.
//!
//! [`WebSocketTransport`] is the production implementation on top of
//! `tokio-tungstenite` (TLS through rustls for `wss://` targets).

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame, Message};

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code reported when the peer's close frame carries none.
const CLOSE_NO_STATUS: u16 = 1005;

/// One inbound transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// Text message; normally one encoded frame.
    Text(String),
    /// Binary message; decoded as a frame when it is UTF-8.
    Binary(Vec<u8>),
    /// Keepalive ping.
    Ping(Vec<u8>),
    /// Keepalive pong.
    Pong(Vec<u8>),
    /// The peer closed the connection.
    Close {
        /// Close status code.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

impl WsMessage {
    /// Map a tungstenite message. Raw frames have no counterpart.
    fn from_tungstenite(message: Message) -> Option<Self> {
        Some(match message {
            Message::Text(text) => Self::Text(text),
            Message::Binary(data) => Self::Binary(data),
            Message::Ping(data) => Self::Ping(data),
            Message::Pong(data) => Self::Pong(data),
            Message::Close(frame) => Self::closed_by(frame),
            Message::Frame(_) => return None,
        })
    }

    fn closed_by(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self::Close {
                code: frame.code.into(),
                reason: frame.reason.into_owned(),
            },
            None => Self::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
        }
    }
}

/// Opens connections to a target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `target` and hand back its write and read halves.
    ///
    /// Returning `Ok` is the "transport open" event.
    async fn open(
        &self,
        target: &str,
    ) -> Result<(Box<dyn TransportWriter>, Box<dyn TransportReader>)>;
}

/// Outbound half of an open connection.
#[async_trait]
pub trait TransportWriter: Send {
    /// Write `text` as one text message, byte for byte.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Start the closing handshake.
    async fn send_close(&mut self) -> Result<()>;
}

/// Inbound half of an open connection.
#[async_trait]
pub trait TransportReader: Send {
    /// Next inbound message, or `None` once the connection is gone.
    ///
    /// Polled inside `tokio::select!`, so it must be cancel-safe.
    async fn recv(&mut self) -> Option<Result<WsMessage>>;
}

/// Outbound half of a WebSocket connection.
#[derive(Debug)]
pub struct SocketWriter {
    sink: SplitSink<Socket, Message>,
}

#[async_trait]
impl TransportWriter for SocketWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(Message::Text(text.to_owned()))
            .await
            .context("Failed to write to socket")
    }

    async fn send_close(&mut self) -> Result<()> {
        self.sink
            .send(Message::Close(None))
            .await
            .context("Failed to send close frame")
    }
}

/// Inbound half of a WebSocket connection.
#[derive(Debug)]
pub struct SocketReader {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl TransportReader for SocketReader {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        while let Some(next) = self.stream.next().await {
            match next {
                Ok(message) => {
                    if let Some(message) = WsMessage::from_tungstenite(message) {
                        return Some(Ok(message));
                    }
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(anyhow::Error::new(e).context("Socket read failed"))),
            }
        }
        None
    }
}

/// `tokio-tungstenite` backed [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    headers: Vec<(String, String)>,
}

impl WebSocketTransport {
    /// Transport without extra handshake headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to the opening HTTP request (e.g. `Origin`).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Upgrade request for `target` carrying the configured headers.
    fn request(&self, target: &str) -> Result<Request<()>> {
        let mut request = target
            .into_client_request()
            .with_context(|| format!("Not a WebSocket URL: {target}"))?;
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Bad header name '{name}'"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("Bad value for header '{name}'"))?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        target: &str,
    ) -> Result<(Box<dyn TransportWriter>, Box<dyn TransportReader>)> {
        let request = self.request(target)?;
        let (socket, response) = tokio_tungstenite::connect_async(request)
            .await
            .context("WebSocket handshake failed")?;
        log::debug!("Socket upgraded ({})", response.status());

        let (sink, stream) = socket.split();
        Ok((
            Box::new(SocketWriter { sink }),
            Box::new(SocketReader { stream }),
        ))
    }
}

/// Rewrite an `http(s)://` URL to the matching `ws(s)://` scheme.
///
/// Any other URL is returned unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    for (http, ws) in [("https://", "wss://"), ("http://", "ws://")] {
        if let Some(rest) = url.strip_prefix(http) {
            return format!("{ws}{rest}");
        }
    }
    url.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_rewrite() {
        assert_eq!(
            http_to_ws_scheme("https://conv.example.com/ws/inter/{ticket}"),
            "wss://conv.example.com/ws/inter/{ticket}"
        );
        assert_eq!(
            http_to_ws_scheme("http://localhost:8085/ws/watcher"),
            "ws://localhost:8085/ws/watcher"
        );
        assert_eq!(
            http_to_ws_scheme("ws://localhost:8085/ws/inter/7"),
            "ws://localhost:8085/ws/inter/7"
        );
        // Only the scheme prefix is touched.
        assert_eq!(
            http_to_ws_scheme("wss://h/ws?back=http://other"),
            "wss://h/ws?back=http://other"
        );
    }

    #[test]
    fn test_close_without_frame_reports_no_status() {
        assert_eq!(
            WsMessage::from_tungstenite(Message::Close(None)),
            Some(WsMessage::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new()
            })
        );
    }

    #[test]
    fn test_request_carries_headers() {
        let transport = WebSocketTransport::new().header("Origin", "https://conv.example.com");
        let request = transport.request("ws://127.0.0.1:8085/ws/inter/7").unwrap();

        assert_eq!(request.uri().path(), "/ws/inter/7");
        assert_eq!(
            request.headers().get("origin").unwrap(),
            "https://conv.example.com"
        );
    }

    #[test]
    fn test_request_rejects_bad_input() {
        assert!(WebSocketTransport::new().request("not a url").is_err());
        assert!(WebSocketTransport::new()
            .header("bad header", "x")
            .request("ws://127.0.0.1:8085/")
            .is_err());
    }

    #[tokio::test]
    async fn test_open_unreachable_host_fails() {
        let result = WebSocketTransport::new()
            .open("ws://127.0.0.1:1/ws/inter/1")
            .await;
        assert!(result.is_err());
    }
}
