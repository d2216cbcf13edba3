//! Append-only trail of session state transitions.
//!
//! The log is purely diagnostic. Message delivery never depends on it; tests
//! and operators read it to see how a session got where it is.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::Result;
use crate::session::ConnectionState;

// ============================================================================
// EventLogEntry
// ============================================================================

/// A single recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventLogEntry {
    /// Wall-clock time of the transition.
    pub timestamp: SystemTime,
    /// State before the transition.
    pub from: ConnectionState,
    /// State after the transition.
    pub to: ConnectionState,
    /// Error that caused the transition, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// EventLog
// ============================================================================

/// Shared, append-only event log.
///
/// Clones share the same underlying storage. Entries can only be added by
/// the crate; callers get copies.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<EventLogEntry>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transition.
    pub(crate) fn record(
        &self,
        from: ConnectionState,
        to: ConnectionState,
        error: Option<String>,
    ) {
        self.entries.lock().push(EventLogEntry {
            timestamp: SystemTime::now(),
            from,
            to,
            error,
        });
    }

    /// Returns a snapshot of all entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<EventLogEntry> {
        self.entries.lock().clone()
    }

    /// Returns the `(from, to)` pairs in order.
    #[must_use]
    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.entries.lock().iter().map(|e| (e.from, e.to)).collect()
    }

    /// Returns the sequence of entered states in order.
    #[must_use]
    pub fn states(&self) -> Vec<ConnectionState> {
        self.entries.lock().iter().map(|e| e.to).collect()
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Serializes the log as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let entries = self.entries.lock();
        Ok(serde_json::to_string(&*entries)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use ConnectionState::*;

    #[test]
    fn test_record_preserves_order() {
        let log = EventLog::new();
        log.record(Disconnected, Connecting, None);
        log.record(Connecting, Open, None);

        assert_eq!(log.len(), 2);
        assert_eq!(
            log.transitions(),
            vec![(Disconnected, Connecting), (Connecting, Open)]
        );
        assert_eq!(log.states(), vec![Connecting, Open]);
    }

    #[test]
    fn test_clones_share_storage() {
        let log = EventLog::new();
        let reader = log.clone();
        assert!(reader.is_empty());

        log.record(Disconnected, Closed, None);
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn test_to_json() {
        let log = EventLog::new();
        log.record(Connecting, Reconnecting, Some("refused".into()));

        let json = log.to_json().expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value[0]["from"], "Connecting");
        assert_eq!(value[0]["to"], "Reconnecting");
        assert_eq!(value[0]["error"], "refused");
    }
}
