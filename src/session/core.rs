//! Caller-facing session handle.
//!
//! # Example
//!
//! ```no_run
//! use ws_relay::{Session, SessionOptions};
//!
//! # async fn example() -> ws_relay::Result<()> {
//! let session = Session::websocket(SessionOptions::new())?;
//! session.start("ws://127.0.0.1:8080/chat")?;
//!
//! session.send("hello").await?;
//! let reply = session.poll_inbound().await?;
//! println!("{}", reply.text());
//!
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::event_log::EventLog;
use crate::identifiers::{SequenceNumber, SessionId};
use crate::message::{InboundMessage, OutboundMessage};
use crate::transport::{Connector, WsConnector};

use super::driver::Driver;
use super::options::SessionOptions;
use super::state::{CloseReason, ConnectionState};

// ============================================================================
// Shared
// ============================================================================

/// State shared between the handle and its driver task.
pub(crate) struct Shared {
    /// Session identity for logs.
    pub id: SessionId,
    /// Current state; receivers are woken on every transition.
    state: watch::Sender<ConnectionState>,
    /// Set once by [`Session::shutdown`] or on drop.
    shutdown: watch::Sender<bool>,
    /// Transition trail.
    log: EventLog,
    /// Recorded just before the `Closed` transition.
    close_reason: Mutex<Option<CloseReason>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            id: SessionId::generate(),
            state: watch::Sender::new(ConnectionState::Disconnected),
            shutdown: watch::Sender::new(false),
            log: EventLog::new(),
            close_reason: Mutex::new(None),
        }
    }

    /// Returns the current state.
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribes to the shutdown flag.
    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Applies a transition if legal and records it.
    ///
    /// Returns `false` if the transition was rejected.
    pub(crate) fn transition(&self, to: ConnectionState, error: Option<&Error>) -> bool {
        let mut from = None;

        self.state.send_if_modified(|current| {
            if !current.can_transition_to(to) {
                return false;
            }
            self.log
                .record(*current, to, error.map(ToString::to_string));
            from = Some(*current);
            *current = to;
            true
        });

        match from {
            Some(from) => {
                debug!(session = %self.id, %from, %to, "State transition");
                true
            }
            None => {
                warn!(session = %self.id, current = %self.state(), %to, "Rejected state transition");
                false
            }
        }
    }

    /// Records the close reason (first one wins) and enters `Closed`.
    pub(crate) fn close(&self, reason: CloseReason, error: Option<&Error>) {
        if self.state().is_terminal() {
            return;
        }
        self.close_reason.lock().get_or_insert(reason);
        self.transition(ConnectionState::Closed, error);
    }
}

/// Waits until the shutdown flag is raised.
pub(crate) async fn stopped(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|stop| *stop).await;
}

// ============================================================================
// Session
// ============================================================================

/// Channels handed to the driver when the session starts.
pub(crate) struct DriverChannels {
    pub outbound_rx: mpsc::Receiver<OutboundMessage>,
    pub inbound_tx: mpsc::UnboundedSender<InboundMessage>,
}

/// A reconnecting WebSocket session.
///
/// All methods take `&self`; wrap the session in an `Arc` to share it
/// between tasks. Dropping the session shuts it down.
///
/// # Thread Safety
///
/// `shutdown` may be called concurrently with in-flight `send` and
/// `poll_inbound`; those return [`Error::SessionClosed`] instead of hanging.
pub struct Session {
    shared: Arc<Shared>,
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    url: Mutex<Option<Url>>,
    /// Next sequence number; locked while enqueueing so queue order matches
    /// sequence order.
    sequence: Mutex<SequenceNumber>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    /// Present until the driver is spawned.
    pending: Mutex<Option<DriverChannels>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

// ============================================================================
// Session - Constructor
// ============================================================================

impl Session {
    /// Creates a session that connects through `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` are invalid.
    pub fn new(options: SessionOptions, connector: Arc<dyn Connector>) -> Result<Self> {
        options.validate()?;

        let (outbound_tx, outbound_rx) = mpsc::channel(options.outbound_capacity);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            shared: Arc::new(Shared::new()),
            options,
            connector,
            url: Mutex::new(None),
            sequence: Mutex::new(SequenceNumber::ZERO),
            outbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            pending: Mutex::new(Some(DriverChannels {
                outbound_rx,
                inbound_tx,
            })),
            driver: Mutex::new(None),
        })
    }

    /// Creates a session over `tokio-tungstenite`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` are invalid.
    pub fn websocket(options: SessionOptions) -> Result<Self> {
        Self::new(options, Arc::new(WsConnector::new()))
    }
}

// ============================================================================
// Session - Public API
// ============================================================================

impl Session {
    /// Validates `url` and starts connecting in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::Config`] if the scheme is not `ws`/`wss`, the host is
    ///   missing, or the session was already started
    /// - [`Error::SessionClosed`] if the session was shut down
    pub fn start(&self, url: &str) -> Result<()> {
        let url = parse_url(url)?;

        if self.state().is_terminal() {
            return Err(Error::SessionClosed);
        }

        let channels = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| Error::config("Session already started"))?;

        *self.url.lock() = Some(url.clone());

        let span = info_span!("session", id = %self.shared.id, url = %url);
        let driver = Driver::new(
            Arc::clone(&self.shared),
            Arc::clone(&self.connector),
            self.options.clone(),
            url,
            channels,
        );
        *self.driver.lock() = Some(tokio::spawn(driver.run().instrument(span)));

        Ok(())
    }

    /// Queues `text` for the peer.
    ///
    /// Accepted only while [`Open`](ConnectionState::Open). Suspends while
    /// the outbound queue is full.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the session is closing or closed, or
    ///   closes while waiting for queue capacity
    /// - [`Error::NotOpen`] if the session is connecting or reconnecting
    pub async fn send(&self, text: impl Into<String>) -> Result<SequenceNumber> {
        self.ensure_open()?;

        let text = text.into();
        let mut shutdown = self.shared.shutdown_signal();

        let permit = tokio::select! {
            biased;
            () = stopped(&mut shutdown) => return Err(Error::SessionClosed),
            permit = self.outbound_tx.reserve() => permit.map_err(|_| Error::SessionClosed)?,
        };

        // The state may have moved while waiting for capacity.
        self.ensure_open()?;

        let mut sequence = self.sequence.lock();
        *sequence = sequence.next();
        permit.send(OutboundMessage::new(*sequence, text));

        trace!(session = %self.shared.id, sequence = %*sequence, "Message queued");
        Ok(*sequence)
    }

    /// Waits for the next message from the peer.
    ///
    /// Messages are returned in receive order. Messages received before the
    /// session closed are still returned before the end-of-session error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] once the session has ended and all
    /// received messages were delivered.
    pub async fn poll_inbound(&self) -> Result<InboundMessage> {
        let mut inbound = self.inbound_rx.lock().await;
        inbound.recv().await.ok_or(Error::SessionClosed)
    }

    /// Drives the session to [`Closed`](ConnectionState::Closed).
    ///
    /// Idempotent. Queued outbound messages are not flushed. Returns once
    /// the transport has been released.
    pub async fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);

        // Never started: nothing to tear down.
        if self.pending.lock().take().is_some() {
            self.shared.close(CloseReason::Shutdown, None);
        }

        let driver = self.driver.lock().take();
        match driver {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!(session = %self.shared.id, error = %e, "Session driver failed");
                    self.shared.close(CloseReason::Shutdown, None);
                }
            }
            None => {
                self.wait_for_state(ConnectionState::Closed).await;
            }
        }
    }

    /// Waits until the session is in `target` or has closed.
    ///
    /// Returns the state observed.
    pub async fn wait_for_state(&self, target: ConnectionState) -> ConnectionState {
        self.wait_until(|current| current == target).await
    }

    /// Waits until `done` accepts the current state or the session has
    /// closed.
    ///
    /// Returns the state observed.
    pub async fn wait_until(
        &self,
        mut done: impl FnMut(ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut state = self.shared.state.subscribe();
        state
            .wait_for(|current| done(*current) || current.is_terminal())
            .await
            .map(|current| *current)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Waits until the session has closed and returns why.
    pub async fn closed(&self) -> CloseReason {
        self.wait_for_state(ConnectionState::Closed).await;
        self.close_reason().unwrap_or(CloseReason::Shutdown)
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the session ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns the URL passed to [`start`](Self::start), once started.
    #[must_use]
    pub fn url(&self) -> Option<Url> {
        self.url.lock().clone()
    }

    /// Returns the transition log.
    #[inline]
    #[must_use]
    pub fn event_log(&self) -> &EventLog {
        &self.shared.log
    }

    /// Returns why the session closed, if it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason.lock().clone()
    }

    /// Returns the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn outbound_capacity(&self) -> usize {
        self.options.outbound_capacity
    }

    /// Returns the last sequence number handed out.
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        *self.sequence.lock()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            state if state.is_closing() => Err(Error::SessionClosed),
            state => Err(Error::not_open(state)),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("url", &self.url())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The driver observes this, closes the transport and exits.
        self.shared.shutdown.send_replace(true);
    }
}

// ============================================================================
// URL Validation
// ============================================================================

/// Parses a WebSocket URL.
fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;

    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(Error::config(format!(
            "Unsupported URL scheme '{}': expected ws or wss",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::config(format!("URL has no host: {raw}")));
    }
    if url.scheme() == "wss" && !cfg!(feature = "native-tls") {
        return Err(Error::config(
            "wss:// requires TLS support; rebuild with the `native-tls` feature",
        ));
    }

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
