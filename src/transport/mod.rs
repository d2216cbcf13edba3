//! WebSocket transport layer.
//!
//! The session never talks to a socket directly. It drives a [`Transport`]
//! obtained from a [`Connector`], which keeps framing, handshakes and
//! ping/pong inside the WebSocket library.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │                              │  Chat server    │
//! │                 │         WebSocket            │                 │
//! │  Connector      │─────────────────────────────►│                 │
//! │  → Transport    │◄────────────────────────────►│                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` client transport |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// `tokio-tungstenite` client transport.
pub mod websocket;

/// Scripted in-memory transport for tests.
#[cfg(test)]
pub(crate) mod memory;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::{WsConnector, WsTransport};

// ============================================================================
// Traits
// ============================================================================

/// One open WebSocket connection.
///
/// Owned exclusively by the session driver.
#[async_trait]
pub trait Transport: Send {
    /// Sends a text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Waits for the next text frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection.
    /// Must be cancel-safe: dropping the future loses no frame.
    async fn receive(&mut self) -> Result<Option<String>>;

    /// Keepalive hook, called periodically while the connection is open.
    async fn heartbeat(&mut self) -> Result<()> {
        Ok(())
    }

    /// When the peer last sent any frame, control frames included.
    ///
    /// `None` disables the silence check.
    fn last_seen(&self) -> Option<Instant> {
        None
    }

    /// Closes the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens [`Transport`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects and completes the handshake.
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>>;
}
