//! Session configuration.
//!
//! Provides a type-safe interface for reconnection, backpressure and
//! keepalive settings. Every value has a default; the CLI overrides them.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use ws_relay::{Backoff, SessionOptions};
//!
//! let options = SessionOptions::new()
//!     .with_max_retries(5)
//!     .with_backoff(Backoff::new(Duration::from_millis(250), 2.0, Duration::from_secs(10)))
//!     .with_outbound_capacity(32);
//!
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default delay before the first retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default growth factor between retries.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default upper bound on a single retry delay.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Default number of consecutive failures tolerated (0 = unlimited).
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default outbound queue capacity.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 16;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default keepalive interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff schedule.
///
/// The delay before retry `n` (0-based) is `min(base * multiplier^n, cap)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor, at least 1.0.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl Backoff {
    /// Creates a backoff schedule.
    #[inline]
    #[must_use]
    pub const fn new(base: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            cap,
        }
    }

    /// Returns the delay before retry `attempt` (0-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.cap.as_secs_f64() {
            return self.cap;
        }
        Duration::from_secs_f64(secs).min(self.cap)
    }

    /// Validates the schedule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the multiplier is below 1.0 or not
    /// finite, or if the base exceeds the cap.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::config(format!(
                "Backoff multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.base > self.cap {
            return Err(Error::config(format!(
                "Backoff base ({}ms) exceeds cap ({}ms)",
                self.base.as_millis(),
                self.cap.as_millis()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Decides whether and when a failed session retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnect at all.
    pub enabled: bool,
    /// Consecutive failed attempts tolerated; 0 means unlimited.
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Backoff::default(),
        }
    }
}

impl ReconnectPolicy {
    /// Creates a policy that never reconnects.
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Returns `true` if another attempt is allowed after `failures`
    /// consecutive failed attempts.
    #[inline]
    #[must_use]
    pub const fn allows_retry(&self, failures: u32) -> bool {
        self.enabled && (self.max_retries == 0 || failures <= self.max_retries)
    }
}

// ============================================================================
// SessionOptions
// ============================================================================

/// Settings for a [`Session`](super::Session).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
    /// Bounded outbound queue capacity.
    pub outbound_capacity: usize,
    /// Maximum time for a single handshake.
    pub connect_timeout: Duration,
    /// Keepalive interval while open.
    pub heartbeat_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl SessionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl SessionOptions {
    /// Sets the reconnection policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Disables reconnection.
    #[inline]
    #[must_use]
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect.enabled = false;
        self
    }

    /// Sets the retry budget (0 = unlimited).
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.reconnect.max_retries = max_retries;
        self
    }

    /// Sets the backoff schedule.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.reconnect.backoff = backoff;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the keepalive interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl SessionOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on zero capacity, zero timeouts, or an
    /// invalid backoff schedule.
    pub fn validate(&self) -> Result<()> {
        if self.outbound_capacity == 0 {
            return Err(Error::config("Outbound capacity must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("Heartbeat interval must be greater than zero"));
        }
        self.reconnect.backoff.validate()
    }
}

// ============================================================================
// Tests
// ============================================================================
