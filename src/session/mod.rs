//! Session lifecycle and relay loop.
//!
//! A [`Session`] owns at most one open [`Transport`](crate::transport::Transport)
//! at a time and moves text between it and the caller. A background driver
//! task runs the connection state machine and applies the reconnection
//! policy.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Session`] | Caller-facing handle: start, send, poll, shutdown |
//! | [`ConnectionState`] | Lifecycle state machine |
//! | [`CloseReason`] | Why a session ended |
//! | [`SessionOptions`] | Reconnect, backpressure and keepalive settings |
//! | [`ReconnectPolicy`] / [`Backoff`] | Retry budget and delay schedule |

// ============================================================================
// Submodules
// ============================================================================

/// Caller-facing session handle.
pub mod core;

/// Background connection driver.
mod driver;

/// Session configuration.
pub mod options;

/// Connection lifecycle states.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Session;
pub use options::{Backoff, ReconnectPolicy, SessionOptions};
pub use state::{CloseReason, ConnectionState};
