//! Scripted in-memory transport.
//!
//! Each connection attempt consumes one [`Attempt`] from the script (the
//! fallback applies once the script runs out). Accepted connections hand a
//! [`MemoryPeer`] to the test so it can push frames, hang up, and inspect
//! what the session wrote.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use url::Url;

use crate::error::{Error, Result};

use super::{Connector, Transport};

// ============================================================================
// Types
// ============================================================================

/// Outcome of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// Handshake succeeds.
    Accept,
    /// Handshake fails immediately.
    Fail,
    /// Endpoint is unusable (configuration error).
    Reject,
    /// Handshake never completes.
    Hang,
}

/// Frame pushed by the peer.
enum Frame {
    Text(String),
    Fail(String),
}

// ============================================================================
// ScriptedConnector
// ============================================================================

pub(crate) struct ScriptedConnector {
    script: Mutex<VecDeque<Attempt>>,
    fallback: Attempt,
    attempts: AtomicU32,
    /// Every payload written by any transport, in write order.
    written: Arc<Mutex<Vec<String>>>,
    /// Writes block while this is `false`.
    write_gate: watch::Sender<bool>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl ScriptedConnector {
    pub(crate) fn new(
        script: impl IntoIterator<Item = Attempt>,
        fallback: Attempt,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: AtomicU32::new(0),
            written: Arc::new(Mutex::new(Vec::new())),
            write_gate: watch::Sender::new(true),
            peers,
        });
        (connector, peer_rx)
    }

    /// Connector whose every attempt succeeds.
    pub(crate) fn accepting() -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        Self::new([], Attempt::Accept)
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    /// Blocks (`false`) or releases (`true`) every transport write.
    pub(crate) fn set_writable(&self, writable: bool) {
        self.write_gate.send_replace(writable);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &Url) -> Result<Box<dyn Transport>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self.script.lock().pop_front().unwrap_or(self.fallback);

        match outcome {
            Attempt::Fail => Err(Error::connect(format!("scripted failure #{attempt}"))),
            Attempt::Reject => Err(Error::config("TLS support not compiled in")),
            Attempt::Hang => std::future::pending().await,
            Attempt::Accept => {
                let (frames, incoming) = mpsc::unbounded_channel();
                let (alive, alive_rx) = watch::channel(());
                let closed = Arc::new(AtomicBool::new(false));
                let _ = self.peers.send(MemoryPeer {
                    frames,
                    _alive: alive,
                    closed: Arc::clone(&closed),
                });
                Ok(Box::new(MemoryTransport {
                    incoming,
                    alive: alive_rx,
                    closed,
                    written: Arc::clone(&self.written),
                    write_gate: self.write_gate.subscribe(),
                    last_seen: Instant::now(),
                }))
            }
        }
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Remote end of one accepted connection.
pub(crate) struct MemoryPeer {
    frames: mpsc::UnboundedSender<Frame>,
    /// Dropped on hang-up; fails writes stuck behind the gate.
    _alive: watch::Sender<()>,
    closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    pub(crate) fn push(&self, text: impl Into<String>) {
        let _ = self.frames.send(Frame::Text(text.into()));
    }

    /// Makes the next receive fail.
    pub(crate) fn fail(&self, message: impl Into<String>) {
        let _ = self.frames.send(Frame::Fail(message.into()));
    }

    /// Closes the connection from the remote side.
    pub(crate) fn hang_up(self) {
        drop(self);
    }

    /// Returns `true` once the session closed its transport.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MemoryTransport
// ============================================================================

struct MemoryTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    alive: watch::Receiver<()>,
    closed: Arc<AtomicBool>,
    written: Arc<Mutex<Vec<String>>>,
    write_gate: watch::Receiver<bool>,
    last_seen: Instant,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::send("transport closed"));
        }
        let gate_open = tokio::select! {
            opened = gate_opened(&mut self.write_gate) => opened,
            _ = self.alive.changed() => false,
        };
        if !gate_open {
            return Err(Error::send("peer gone"));
        }
        self.written.lock().push(text);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Option<String>> {
        let frame = self.incoming.recv().await;
        if frame.is_some() {
            self.last_seen = Instant::now();
        }
        match frame {
            Some(Frame::Text(text)) => Ok(Some(text)),
            Some(Frame::Fail(message)) => Err(Error::receive(message)),
            None => Ok(None),
        }
    }

    fn last_seen(&self) -> Option<Instant> {
        Some(self.last_seen)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn gate_opened(gate: &mut watch::Receiver<bool>) -> bool {
    gate.wait_for(|open| *open).await.is_ok()
}
