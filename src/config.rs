//! Session configuration: endpoint address and retry policy.
//!
//! The endpoint is fixed at construction time; there is no runtime
//! reconfiguration of where a session points. Reconnect behavior is
//! controlled by [`RetryPolicy`]; [`RetryPolicy::disabled`] reproduces a
//! strict single-attempt lifecycle where a lost connection is terminal.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use playground_client::{RetryPolicy, SessionConfig};
//!
//! let config = SessionConfig::new("ws://127.0.0.1:8080")
//!     .expect("valid endpoint")
//!     .with_retry_policy(
//!         RetryPolicy::new()
//!             .with_max_attempts(3)
//!             .with_initial_backoff(Duration::from_millis(250)),
//!     )
//!     .with_connect_timeout(Duration::from_secs(10));
//!
//! assert_eq!(config.endpoint.scheme(), "ws");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default total number of connect attempts before a terminal state.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Ceiling for the exponentially doubled backoff delay.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(16);

/// Default timeout for a single connect attempt (30s).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// RetryPolicy
// ============================================================================

/// Bounded exponential-backoff reconnect policy.
///
/// `max_attempts` counts every connect attempt over the session's lifetime,
/// including the initial one. Between attempts the supervisor sleeps a
/// delay that starts at `initial_backoff` and doubles up to `max_backoff`;
/// a successful connection resets the delay, not the attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connect attempts allowed (including the first). Must be >= 1.
    pub max_attempts: u32,

    /// Delay before the first reconnect attempt.
    pub initial_backoff: Duration,

    /// Upper bound on the backoff delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    /// Creates a policy with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Creates a policy that never reconnects.
    ///
    /// One connect attempt is made; once the connection is lost or the
    /// attempt fails, the session is terminal.
    #[inline]
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Sets the total number of connect attempts.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay before the first reconnect attempt.
    #[inline]
    #[must_use]
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Sets the backoff ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Returns the delay to use after `current`, doubled and capped.
    #[inline]
    #[must_use]
    pub(crate) fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_backoff)
    }
}

// ============================================================================
// SessionConfig
// ============================================================================

/// Validated configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the evaluation service.
    pub endpoint: Url,

    /// Reconnect policy.
    pub retry: RetryPolicy,

    /// Timeout for a single connect attempt.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Creates a configuration for the given endpoint with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address cannot be parsed as a URL
    /// or its scheme is not `ws`/`wss`.
    pub fn new(endpoint: impl AsRef<str>) -> Result<Self> {
        let endpoint = endpoint.as_ref();
        let url = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint `{endpoint}`: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported endpoint scheme `{}`: expected ws:// or wss://",
                url.scheme()
            )));
        }

        Ok(Self {
            endpoint: url,
            retry: RetryPolicy::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-attempt connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the retry policy allows zero attempts.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry policy must allow at least one attempt"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
