//! Terminal-to-WebSocket relay.
//!
//! Wires an [`InputSource`] and a [`Session`] together: typed lines go out,
//! received messages are written to the output sink one per line, and a
//! process signal, the quit command or end of input shut the session down.
//!
//! # Exit Status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Normal shutdown (end of input, quit command, signal) |
//! | 1 | Unrecoverable connectivity failure |
//! | 2 | Invalid configuration |
//! | 74 | Local input could not be opened |

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, trace, warn};

use crate::error::{EXIT_CONFIG, EXIT_CONNECTIVITY, EXIT_INPUT, EXIT_OK, Error, Result};
use crate::input::InputSource;
use crate::session::{CloseReason, ConnectionState, Session, SessionOptions};
use crate::transport::{Connector, WsConnector};

// ============================================================================
// Constants
// ============================================================================

/// Endpoint used when no URL is given.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/chat";

/// Input line that ends the relay.
pub const DEFAULT_QUIT_COMMAND: &str = "/quit";

// ============================================================================
// RelayConfig
// ============================================================================

/// Relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Session settings.
    pub session: SessionOptions,
    /// Line that triggers a graceful shutdown.
    pub quit_command: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            session: SessionOptions::default(),
            quit_command: DEFAULT_QUIT_COMMAND.to_string(),
        }
    }
}

impl RelayConfig {
    /// Creates a configuration for `url` with default settings.
    #[inline]
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the session settings.
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    /// Sets the quit command.
    #[inline]
    #[must_use]
    pub fn with_quit_command(mut self, command: impl Into<String>) -> Self {
        self.quit_command = command.into();
        self
    }

    /// Validates the configuration.
    ///
    /// The URL itself is checked when the session starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the quit command is empty or the session
    /// settings are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.quit_command.is_empty() {
            return Err(Error::config("Quit command must not be empty"));
        }
        self.session.validate()
    }
}

// ============================================================================
// RelayExit
// ============================================================================

/// How the relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// End of input, quit command or signal.
    Normal,
    /// The session could not stay connected.
    ConnectivityFailure,
    /// The URL or an option was invalid.
    InvalidConfig,
    /// Local input could not be opened.
    InputUnavailable,
}

impl RelayExit {
    /// Returns the process exit code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Normal => EXIT_OK,
            Self::ConnectivityFailure => EXIT_CONNECTIVITY,
            Self::InvalidConfig => EXIT_CONFIG,
            Self::InputUnavailable => EXIT_INPUT,
        }
    }

    /// Maps a startup error onto an exit status.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        if err.is_config_error() {
            Self::InvalidConfig
        } else if err.exit_code() == EXIT_OK {
            Self::Normal
        } else {
            Self::ConnectivityFailure
        }
    }
}

impl From<&CloseReason> for RelayExit {
    fn from(reason: &CloseReason) -> Self {
        match reason {
            CloseReason::InvalidConfig { .. } => Self::InvalidConfig,
            _ if reason.is_failure() => Self::ConnectivityFailure,
            _ => Self::Normal,
        }
    }
}

impl From<RelayExit> for ExitCode {
    fn from(exit: RelayExit) -> Self {
        ExitCode::from(exit.code())
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Moves lines between a user and a WebSocket peer.
pub struct Relay {
    config: RelayConfig,
    session: Session,
}

impl Relay {
    /// Creates a relay over `tokio-tungstenite`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: RelayConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(WsConnector::new()))
    }

    /// Creates a relay over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the session settings are invalid.
    pub fn with_connector(config: RelayConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let session = Session::new(config.session.clone(), connector)?;
        Ok(Self { config, session })
    }

    /// Returns the underlying session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until the session closes.
    ///
    /// `signal` completing (e.g. Ctrl-C) shuts the session down.
    pub async fn run<W, S>(&self, mut input: InputSource, mut output: W, signal: S) -> RelayExit
    where
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        if let Err(err) = self.session.start(&self.config.url) {
            error!(url = %self.config.url, error = %err, "Cannot start session");
            return RelayExit::from_error(&err);
        }
        info!(url = %self.config.url, session = %self.session.id(), "Relay started");

        tokio::pin!(signal);
        let mut input_open = true;
        let mut interrupted = false;

        loop {
            tokio::select! {
                biased;

                () = &mut signal, if !interrupted => {
                    info!("Interrupted");
                    interrupted = true;
                    input_open = false;
                    self.session.shutdown().await;
                }

                inbound = self.session.poll_inbound() => match inbound {
                    Ok(message) => {
                        if let Err(e) = write_line(&mut output, message.text()).await {
                            warn!(error = %e, "Output closed");
                            input_open = false;
                            self.session.shutdown().await;
                        }
                    }
                    // Session over and every received message delivered
                    Err(_) => break,
                },

                line = input.next_line(), if input_open => match line {
                    Ok(Some(line)) if line == self.config.quit_command => {
                        info!("Quit requested");
                        input_open = false;
                        self.session.shutdown().await;
                    }
                    Ok(Some(line)) => {
                        tokio::select! {
                            biased;
                            () = &mut signal, if !interrupted => {
                                info!("Interrupted");
                                interrupted = true;
                                input_open = false;
                                self.session.shutdown().await;
                            }
                            () = self.forward(line) => {}
                        }
                    }
                    Ok(None) => {
                        info!("End of input");
                        input_open = false;
                        self.session.shutdown().await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Input failed");
                        input_open = false;
                        self.session.shutdown().await;
                    }
                },
            }
        }

        if let Err(e) = output.flush().await {
            debug!(error = %e, "Output flush failed");
        }

        let reason = self.session.closed().await;
        if let Ok(log) = self.session.event_log().to_json() {
            debug!(%log, "Session event log");
        }

        let exit = RelayExit::from(&reason);
        match &reason {
            CloseReason::RetryBudgetExhausted { attempts } => {
                error!(attempts, "Giving up: retry budget exhausted");
            }
            CloseReason::ConnectivityLost { message } => {
                error!(%message, "Connection lost");
            }
            CloseReason::InvalidConfig { message } => {
                error!(%message, "Cannot connect with this configuration");
            }
            CloseReason::Shutdown | CloseReason::RemoteClosed => {
                info!(?reason, "Relay finished");
            }
        }
        exit
    }

    /// Sends one line once the session is open.
    ///
    /// A line typed while connecting waits for that one handshake to finish.
    /// If it fails, or the line meets a reconnect, the line is reported and
    /// dropped, so input keeps being read during long outages.
    async fn forward(&self, line: String) {
        let log = self.session.event_log();
        let start = log.len();
        self.session
            .wait_until(|state| {
                let connecting = matches!(
                    state,
                    ConnectionState::Disconnected | ConnectionState::Connecting
                );
                // A quick retry can carry the state back to `Connecting`
                // before this wakes up, so also look for a finished handshake.
                !connecting
                    || log
                        .transitions()
                        .iter()
                        .skip(start)
                        .any(|(from, _)| *from == ConnectionState::Connecting)
            })
            .await;

        match self.session.send(line).await {
            Ok(sequence) => trace!(%sequence, "Line forwarded"),
            Err(Error::NotOpen { state }) => {
                warn!(%state, "Not connected; line discarded");
            }
            Err(Error::SessionClosed) => debug!("Session closed; line discarded"),
            Err(e) => warn!(error = %e, "Failed to send line"),
        }
    }
}

/// Writes one message followed by a newline.
async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

// ============================================================================
// Tests
// ============================================================================
