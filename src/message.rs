//! Messages flowing through a session.
//!
//! | Type | Direction | Producer | Consumer |
//! |------|-----------|----------|----------|
//! | [`OutboundMessage`] | Local → Remote | [`Session::send`](crate::Session::send) | Session writer |
//! | [`InboundMessage`] | Remote → Local | Session reader | [`Session::poll_inbound`](crate::Session::poll_inbound) |
//!
//! Both are immutable once created and are consumed exactly once.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::SequenceNumber;

// ============================================================================
// OutboundMessage
// ============================================================================

/// Text payload queued for the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    sequence: SequenceNumber,
    text: String,
}

impl OutboundMessage {
    /// Creates a new outbound message.
    #[inline]
    #[must_use]
    pub fn new(sequence: SequenceNumber, text: impl Into<String>) -> Self {
        Self {
            sequence,
            text: text.into(),
        }
    }

    /// Returns the sequence number assigned by the session.
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the message, returning the payload.
    #[inline]
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// Text payload received from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    text: String,
}

impl InboundMessage {
    /// Creates a new inbound message.
    #[inline]
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consumes the message, returning the payload.
    #[inline]
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}
