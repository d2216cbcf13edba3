//! Error types for the relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ws_relay::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     session.send("hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Handling |
//! |----------|----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] | Fatal, exit code 2 |
//! | Connectivity | [`Error::Connect`], [`Error::Handshake`], [`Error::ConnectTimeout`] | Transient, retried |
//! | Traffic | [`Error::Send`], [`Error::Receive`] | Transient, triggers reconnect |
//! | Lifecycle | [`Error::SessionClosed`], [`Error::NotOpen`] | Expected, not fatal |
//! | Budget | [`Error::RetryBudgetExhausted`] | Fatal, exit code 1 |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] | Wrapped |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::session::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit code for a normal shutdown.
pub const EXIT_OK: u8 = 0;

/// Process exit code for an unrecoverable connectivity failure.
pub const EXIT_CONNECTIVITY: u8 = 1;

/// Process exit code for invalid configuration.
pub const EXIT_CONFIG: u8 = 2;

/// Process exit code when local input cannot be read (`EX_IOERR`).
pub const EXIT_INPUT: u8 = 74;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the URL or a relay option is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Connectivity Errors
    // ========================================================================
    /// TCP or WebSocket connection could not be established.
    #[error("Connection failed: {message}")]
    Connect {
        /// Description of the connection error.
        message: String,
    },

    /// WebSocket handshake was rejected by the peer.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Traffic Errors
    // ========================================================================
    /// Writing to the transport failed.
    #[error("Send failed: {message}")]
    Send {
        /// Description of the send failure.
        message: String,
    },

    /// Reading from the transport failed.
    #[error("Receive failed: {message}")]
    Receive {
        /// Description of the receive failure.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The session is closing or closed.
    ///
    /// Returned to any caller racing a shutdown.
    #[error("Session closed")]
    SessionClosed,

    /// The session is alive but not currently open.
    #[error("Session not open (state: {state})")]
    NotOpen {
        /// State the session was in when the call was made.
        state: ConnectionState,
    },

    /// Consecutive connection failures exceeded the retry budget.
    #[error("Retry budget exhausted after {attempts} failed attempts")]
    RetryBudgetExhausted {
        /// Number of consecutive failed connection attempts.
        attempts: u32,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::ConnectTimeout { timeout_ms }
    }

    /// Creates a send error.
    #[inline]
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }

    /// Creates a receive error.
    #[inline]
    pub fn receive(message: impl Into<String>) -> Self {
        Self::Receive {
            message: message.into(),
        }
    }

    /// Creates a not-open error.
    #[inline]
    pub fn not_open(state: ConnectionState) -> Self {
        Self::NotOpen { state }
    }

    /// Creates a retry budget exhausted error.
    #[inline]
    pub fn retry_budget_exhausted(attempts: u32) -> Self {
        Self::RetryBudgetExhausted { attempts }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the reconnection policy should absorb this error.
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Handshake { .. }
                | Self::ConnectTimeout { .. }
                | Self::Send { .. }
                | Self::Receive { .. }
                | Self::Io(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error must terminate the process.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Url(_) | Self::RetryBudgetExhausted { .. }
        )
    }

    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Url(_))
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_config_error() {
            EXIT_CONFIG
        } else if matches!(self, Self::SessionClosed | Self::NotOpen { .. }) {
            EXIT_OK
        } else {
            EXIT_CONNECTIVITY
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
