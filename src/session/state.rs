//! Connection lifecycle states.
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ Disconnected │
//!                 └──────┬───────┘
//!                        ▼
//!   ┌────────────► Connecting ─────────────┐
//!   │                    │                 │
//!   │                    ▼                 ▼
//! Reconnecting ◄────── Open ──► Closing ──► Closed
//!   │                                      ▲
//!   └──────────────────────────────────────┘
//! ```
//!
//! `Closed` is terminal. Any live state may go straight to `Closed` when the
//! session is shut down or the retry budget runs out.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::error::{EXIT_CONFIG, EXIT_CONNECTIVITY, EXIT_OK, Error, Result};

// ============================================================================
// ConnectionState
// ============================================================================

/// State of a [`Session`](super::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    /// Created, not started.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake complete; traffic flows.
    Open,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Local close requested; transport is being closed.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if `self → next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Disconnected, Closed)
                | (Connecting, Open)
                | (Connecting, Reconnecting)
                | (Connecting, Closed)
                | (Open, Reconnecting)
                | (Open, Closing)
                | (Open, Closed)
                | (Reconnecting, Connecting)
                | (Reconnecting, Closed)
                | (Closing, Closed)
        )
    }

    /// Returns `true` for [`Closed`](Self::Closed).
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` once no more outbound data may be accepted.
    #[inline]
    #[must_use]
    pub const fn is_closing(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// CloseReason
// ============================================================================

/// Why a session reached [`ConnectionState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Session::shutdown`](super::Session::shutdown) was called.
    Shutdown,
    /// The peer closed the connection while reconnection was disabled.
    RemoteClosed,
    /// Consecutive connection failures exceeded the retry budget.
    RetryBudgetExhausted {
        /// Number of consecutive failed attempts.
        attempts: u32,
    },
    /// A connection attempt or an open connection failed while reconnection
    /// was disabled.
    ConnectivityLost {
        /// Description of the failure.
        message: String,
    },
    /// A connection attempt failed in a way no retry can fix (e.g. an
    /// unsupported URL).
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },
}

impl CloseReason {
    /// Returns `true` if the session ended abnormally.
    #[inline]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::RetryBudgetExhausted { .. }
                | Self::ConnectivityLost { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Returns the process exit code for this reason.
    #[inline]
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidConfig { .. } => EXIT_CONFIG,
            _ if self.is_failure() => EXIT_CONNECTIVITY,
            _ => EXIT_OK,
        }
    }

    /// Converts the reason into a result, failing for connectivity losses.
    ///
    /// # Errors
    ///
    /// - [`Error::RetryBudgetExhausted`] if the retry budget ran out
    /// - [`Error::Connect`] if connectivity was lost without reconnection
    /// - [`Error::Config`] if the endpoint could not be used at all
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Shutdown | Self::RemoteClosed => Ok(()),
            Self::RetryBudgetExhausted { attempts } => {
                Err(Error::retry_budget_exhausted(attempts))
            }
            Self::ConnectivityLost { message } => Err(Error::connect(message)),
            Self::InvalidConfig { message } => Err(Error::config(message)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use ConnectionState::*;

    const ALL: [ConnectionState; 6] = [Disconnected, Connecting, Open, Reconnecting, Closing, Closed];

    #[test]
    fn test_closed_is_terminal() {
        for next in ALL {
            assert!(!Closed.can_transition_to(next), "Closed -> {next}");
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_every_live_state_can_close() {
        for state in [Disconnected, Connecting, Open, Reconnecting, Closing] {
            assert!(state.can_transition_to(Closed), "{state} -> Closed");
        }
    }

    #[test]
    fn test_lifecycle_edges() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Reconnecting));
        assert!(Open.can_transition_to(Reconnecting));
        assert!(Open.can_transition_to(Closing));
        assert!(Reconnecting.can_transition_to(Connecting));

        assert!(!Disconnected.can_transition_to(Open));
        assert!(!Reconnecting.can_transition_to(Open));
        assert!(!Closing.can_transition_to(Open));
        assert!(!Open.can_transition_to(Connecting));
    }

    #[test]
    fn test_close_reason_exit_codes() {
        assert_eq!(CloseReason::Shutdown.exit_code(), 0);
        assert_eq!(CloseReason::RemoteClosed.exit_code(), 0);
        assert_eq!(CloseReason::RetryBudgetExhausted { attempts: 3 }.exit_code(), 1);

        let invalid = CloseReason::InvalidConfig {
            message: "TLS support not compiled in".into(),
        };
        assert!(invalid.is_failure());
        assert_eq!(invalid.exit_code(), 2);
        assert!(invalid.into_result().is_err_and(|e| e.is_config_error()));
        assert!(
            CloseReason::RetryBudgetExhausted { attempts: 3 }
                .into_result()
                .is_err_and(|e| matches!(e, Error::RetryBudgetExhausted { attempts: 3 }))
        );
    }
}
