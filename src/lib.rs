//! WS Relay - Reconnecting terminal-to-WebSocket relay.
//!
//! This library provides a resilient WebSocket client session plus the
//! relay loop that connects it to a line-oriented terminal.
//!
//! # Architecture
//!
//! - **Session**: caller-facing handle. Enqueues outbound messages, yields
//!   inbound ones, exposes the connection state.
//! - **Driver**: one background task per session. Owns the transport,
//!   performs the handshake, reconnects with exponential backoff.
//! - **Relay**: reads user lines, forwards them, prints what arrives.
//!
//! Key design principles:
//!
//! - All state transitions go through one validated state machine and are
//!   recorded in an [`EventLog`]
//! - Outbound messages are sent in the order they were accepted
//! - Inbound messages are delivered in the order they were received
//! - Every suspension point is cancelled by shutdown
//!
//! # Quick Start
//!
//! ```no_run
//! use ws_relay::{Result, Session, SessionOptions, ConnectionState};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Session::websocket(SessionOptions::new().with_max_retries(5))?;
//!     session.start("ws://127.0.0.1:8080/chat")?;
//!
//!     session.wait_for_state(ConnectionState::Open).await;
//!     session.send("hello").await?;
//!
//!     let reply = session.poll_inbound().await?;
//!     println!("{}", reply.text());
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`event_log`] | Recorded state transitions |
//! | [`identifiers`] | Session and sequence identifiers |
//! | [`input`] | Line-oriented user input |
//! | [`message`] | Outbound and inbound message types |
//! | [`relay`] | Terminal relay loop and exit status |
//! | [`session`] | Session handle, options, state machine |
//! | [`transport`] | Transport traits and WebSocket implementation |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Recorded state transitions.
pub mod event_log;

/// Type-safe identifiers.
pub mod identifiers;

/// Line-oriented user input.
pub mod input;

/// Message types.
pub mod message;

/// Terminal relay loop.
pub mod relay;

/// Connection session.
///
/// Use [`Session::new()`] or [`Session::websocket()`] to create a session.
pub mod session;

/// Transport layer.
///
/// [`Transport`] and [`Connector`] are the seams between the session and
/// the network.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Event log
pub use event_log::{EventLog, EventLogEntry};

// Identifier types
pub use identifiers::{SequenceNumber, SessionId};

// Input
pub use input::InputSource;

// Message types
pub use message::{InboundMessage, OutboundMessage};

// Relay types
pub use relay::{Relay, RelayConfig, RelayExit};

// Session types
pub use session::{Backoff, CloseReason, ConnectionState, ReconnectPolicy, Session, SessionOptions};

// Transport types
pub use transport::{Connector, Transport, WsConnector, WsTransport};
