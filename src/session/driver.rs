//! Background connection driver.
//!
//! One tokio task per started session. It is the only code that changes the
//! session state after `start` and the only owner of the transport.
//!
//! # Event Loop
//!
//! While open, the driver selects over:
//!
//! - the shutdown flag
//! - incoming frames from the transport
//! - queued outbound messages
//! - the heartbeat interval, which pings the peer and gives up on a peer
//!   that has been silent for two periods
//!
//! Every other phase (handshake, backoff sleep, a pending write) is raced
//! against the shutdown flag as well.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::message::{InboundMessage, OutboundMessage};
use crate::transport::{Connector, Transport};

use super::core::{DriverChannels, Shared, stopped};
use super::options::SessionOptions;
use super::state::{CloseReason, ConnectionState};

// ============================================================================
// Constants
// ============================================================================

/// Heartbeat periods without any frame from the peer before the connection
/// is considered dead.
const SILENCE_LIMIT_HEARTBEATS: u32 = 2;

// ============================================================================
// Types
// ============================================================================

/// Result of one connection attempt.
enum Attempt {
    Open(Box<dyn Transport>),
    Failed(Error),
    Shutdown,
}

/// Why the open phase ended.
enum OpenExit {
    /// Shutdown requested; the session is already `Closed`.
    LocalClose,
    /// Peer closed the connection.
    RemoteClosed,
    /// Transport error.
    Failed(Error),
}

// ============================================================================
// Driver
// ============================================================================

pub(crate) struct Driver {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    options: SessionOptions,
    url: Url,
    outbound_rx: mpsc::Receiver<OutboundMessage>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    shutdown: watch::Receiver<bool>,
}

impl Driver {
    pub(crate) fn new(
        shared: Arc<Shared>,
        connector: Arc<dyn Connector>,
        options: SessionOptions,
        url: Url,
        channels: DriverChannels,
    ) -> Self {
        let shutdown = shared.shutdown_signal();
        Self {
            shared,
            connector,
            options,
            url,
            outbound_rx: channels.outbound_rx,
            inbound_tx: channels.inbound_tx,
            shutdown,
        }
    }

    /// Runs the state machine until the session is `Closed`.
    pub(crate) async fn run(mut self) {
        let policy = self.options.reconnect;
        let mut failures: u32 = 0;

        if !self.shared.transition(ConnectionState::Connecting, None) {
            return;
        }

        loop {
            let delay = match self.connect().await {
                Attempt::Shutdown => {
                    self.shared.close(CloseReason::Shutdown, None);
                    break;
                }

                Attempt::Failed(err) => {
                    failures = failures.saturating_add(1);
                    warn!(attempt = failures, error = %err, "Connection attempt failed");

                    if err.is_config_error() {
                        error!(error = %err, "Endpoint cannot be used; not retrying");
                        let reason = CloseReason::InvalidConfig {
                            message: err.to_string(),
                        };
                        self.shared.close(reason, Some(&err));
                        break;
                    }
                    if !policy.enabled {
                        let reason = CloseReason::ConnectivityLost {
                            message: err.to_string(),
                        };
                        self.shared.close(reason, Some(&err));
                        break;
                    }
                    if !policy.allows_retry(failures) {
                        let exhausted = Error::retry_budget_exhausted(failures);
                        error!(attempts = failures, "Giving up: {exhausted}");
                        self.shared.close(
                            CloseReason::RetryBudgetExhausted { attempts: failures },
                            Some(&exhausted),
                        );
                        break;
                    }

                    self.shared
                        .transition(ConnectionState::Reconnecting, Some(&err));
                    policy.backoff.delay(failures - 1)
                }

                Attempt::Open(transport) => {
                    failures = 0;
                    // A send that raced the previous disconnect may have
                    // enqueued after the last drain.
                    self.discard_queued();
                    self.shared.transition(ConnectionState::Open, None);
                    info!("Session open");

                    match self.run_open(transport).await {
                        OpenExit::LocalClose => break,

                        OpenExit::RemoteClosed if !policy.enabled => {
                            self.shared.close(CloseReason::RemoteClosed, None);
                            break;
                        }

                        OpenExit::Failed(err) if !policy.enabled => {
                            let reason = CloseReason::ConnectivityLost {
                                message: err.to_string(),
                            };
                            self.shared.close(reason, Some(&err));
                            break;
                        }

                        exit => {
                            let err = match exit {
                                OpenExit::Failed(err) => Some(err),
                                _ => None,
                            };
                            info!(error = ?err.as_ref().map(ToString::to_string), "Connection lost");
                            self.shared
                                .transition(ConnectionState::Reconnecting, err.as_ref());
                            self.discard_queued();
                            policy.backoff.delay(0)
                        }
                    }
                }
            };

            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
            if !self.backoff(delay).await {
                self.shared.close(CloseReason::Shutdown, None);
                break;
            }
            self.shared.transition(ConnectionState::Connecting, None);
        }

        debug!("Session driver terminated");
    }

    /// Connects, bounded by the handshake timeout and raced against shutdown.
    async fn connect(&mut self) -> Attempt {
        let limit = self.options.connect_timeout;

        tokio::select! {
            biased;

            () = stopped(&mut self.shutdown) => Attempt::Shutdown,

            result = timeout(limit, self.connector.connect(&self.url)) => match result {
                Ok(Ok(transport)) => Attempt::Open(transport),
                Ok(Err(err)) => Attempt::Failed(err),
                Err(_) => Attempt::Failed(Error::connect_timeout(limit.as_millis() as u64)),
            },
        }
    }

    /// Sleeps for `delay`. Returns `false` if shutdown interrupted it.
    async fn backoff(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = stopped(&mut self.shutdown) => false,
            () = sleep(delay) => true,
        }
    }

    /// Relays traffic until the connection ends. Always closes `transport`.
    async fn run_open(&mut self, mut transport: Box<dyn Transport>) -> OpenExit {
        let period = self.options.heartbeat_interval;
        let silence_limit = period.saturating_mul(SILENCE_LIMIT_HEARTBEATS);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                biased;

                () = stopped(&mut self.shutdown) => break OpenExit::LocalClose,

                // Incoming frames from the peer
                received = transport.receive() => match received {
                    Ok(Some(text)) => {
                        trace!(len = text.len(), "Message received");
                        // Receiver gone means the handle was dropped; shutdown follows.
                        let _ = self.inbound_tx.send(InboundMessage::new(text));
                    }
                    Ok(None) => break OpenExit::RemoteClosed,
                    Err(err) => break OpenExit::Failed(err),
                },

                // Queued messages from the caller
                Some(message) = self.outbound_rx.recv() => {
                    let sequence = message.sequence();
                    let written = tokio::select! {
                        biased;
                        () = stopped(&mut self.shutdown) => None,
                        result = transport.send(message.into_text()) => Some(result),
                    };
                    match written {
                        None => break OpenExit::LocalClose,
                        Some(Err(err)) => break OpenExit::Failed(err),
                        Some(Ok(())) => trace!(%sequence, "Message sent"),
                    }
                }

                _ = heartbeat.tick() => {
                    if let Some(seen) = transport.last_seen() {
                        let silent = seen.elapsed();
                        if silent > silence_limit {
                            let message = format!(
                                "no traffic from peer for {}ms",
                                silent.as_millis()
                            );
                            break OpenExit::Failed(Error::receive(message));
                        }
                    }

                    trace!("Heartbeat");
                    let pinged = tokio::select! {
                        biased;
                        () = stopped(&mut self.shutdown) => None,
                        result = transport.heartbeat() => Some(result),
                    };
                    match pinged {
                        None => break OpenExit::LocalClose,
                        Some(Err(err)) => break OpenExit::Failed(err),
                        Some(Ok(())) => {}
                    }
                }
            }
        };

        if matches!(exit, OpenExit::LocalClose) {
            self.shared.transition(ConnectionState::Closing, None);
            close_transport(&mut transport, self.options.connect_timeout).await;
            self.shared.close(CloseReason::Shutdown, None);
            info!("Session closed");
        } else {
            close_transport(&mut transport, self.options.connect_timeout).await;
        }

        exit
    }

    /// Drops messages queued for a connection that no longer exists.
    fn discard_queued(&mut self) {
        let mut dropped = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(dropped, "Discarded messages queued for a lost connection");
        }
    }
}

/// Closes a transport, giving up after `limit`.
async fn close_transport(transport: &mut Box<dyn Transport>, limit: Duration) {
    let result: Result<()> = match timeout(limit, transport.close()).await {
        Ok(result) => result,
        Err(_) => Err(Error::connect_timeout(limit.as_millis() as u64)),
    };
    if let Err(err) = result {
        debug!(error = %err, "Transport close failed");
    }
}
