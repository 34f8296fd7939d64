//! In-memory transport for unit tests.
//!
//! `memory_pair()` returns a transport to hand to the channel and a
//! `MemoryRemote` playing the server: it records everything the client
//! sends and injects inbound messages, errors and closes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ws::{Transport, TransportReader, TransportWriter, WsMessage};

type Inbound = Result<WsMessage>;

#[derive(Debug)]
pub(crate) struct MemoryTransport {
    sent: Arc<Mutex<Vec<String>>>,
    target: Arc<Mutex<Option<String>>>,
    client_closed: Arc<AtomicBool>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    fail_open: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct MemoryRemote {
    sent: Arc<Mutex<Vec<String>>>,
    target: Arc<Mutex<Option<String>>>,
    client_closed: Arc<AtomicBool>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
}

pub(crate) fn memory_pair() -> (MemoryTransport, MemoryRemote) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let target = Arc::new(Mutex::new(None));
    let client_closed = Arc::new(AtomicBool::new(false));
    (
        MemoryTransport {
            sent: Arc::clone(&sent),
            target: Arc::clone(&target),
            client_closed: Arc::clone(&client_closed),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            fail_open: false,
        },
        MemoryRemote {
            sent,
            target,
            client_closed,
            inbound_tx,
        },
    )
}

impl MemoryTransport {
    /// Make `open` fail like a refused connection.
    pub(crate) fn refusing(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

impl MemoryRemote {
    pub(crate) fn push_text(&self, text: &str) {
        let _ = self.inbound_tx.send(Ok(WsMessage::Text(text.to_string())));
    }

    pub(crate) fn push(&self, message: WsMessage) {
        let _ = self.inbound_tx.send(Ok(message));
    }

    pub(crate) fn push_error(&self, msg: &str) {
        let _ = self.inbound_tx.send(Err(anyhow!("{msg}")));
    }

    pub(crate) fn close(&self) {
        self.push(WsMessage::Close {
            code: 1000,
            reason: String::new(),
        });
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn target(&self) -> Option<String> {
        self.target.lock().unwrap().clone()
    }

    pub(crate) fn client_closed(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }
}

struct MemoryWriter {
    sent: Arc<Mutex<Vec<String>>>,
    client_closed: Arc<AtomicBool>,
}

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(
        &self,
        target: &str,
    ) -> Result<(Box<dyn TransportWriter>, Box<dyn TransportReader>)> {
        if self.fail_open {
            return Err(anyhow!("connection refused"));
        }
        let rx = self
            .inbound_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("memory transport already opened"))?;
        *self.target.lock().unwrap() = Some(target.to_string());
        Ok((
            Box::new(MemoryWriter {
                sent: Arc::clone(&self.sent),
                client_closed: Arc::clone(&self.client_closed),
            }),
            Box::new(MemoryReader { rx }),
        ))
    }
}

#[async_trait]
impl TransportWriter for MemoryWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.client_closed.load(Ordering::SeqCst) {
            return Err(anyhow!("already closed"));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_close(&mut self) -> Result<()> {
        self.client_closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TransportReader for MemoryReader {
    async fn recv(&mut self) -> Option<Result<WsMessage>> {
        self.rx.recv().await
    }
}
