//! Evaluation sessions: the surface consumed by presentation code.
//!
//! A [`Session`] owns one connection to the evaluation service and adapts
//! it into the shape the presentation layer consumes: a `connected` flag
//! (plus its observable stream) and a `run` operation. It holds no state
//! of its own; every call delegates to the underlying
//! [`Connection`](crate::transport::Connection).
//!
//! # Example
//!
//! ```no_run
//! use playground_client::{Result, Session};
//!
//! # async fn example() -> Result<()> {
//! let session = Session::builder()
//!     .endpoint("ws://127.0.0.1:8080")
//!     .open()?;
//!
//! session.wait_connected().await?;
//!
//! // Callback style:
//! session.run("1 + 1", |reply| {
//!     println!("result: {}", reply.get_string("result"));
//! })?;
//!
//! // Awaitable style:
//! let reply = session.eval("1 + 1").await?;
//! println!("result: {}", reply.get_string("result"));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::config::{RetryPolicy, SessionConfig};
use crate::error::{Error, Result};
use crate::protocol::EvalReply;
use crate::transport::{Connection, ConnectionState};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a session.
struct SessionInner {
    /// Endpoint the session points at (fixed at construction).
    endpoint: Url,
    /// Connection to the evaluation service.
    connection: Connection,
}

// ============================================================================
// Session
// ============================================================================

/// A handle to an evaluation session.
///
/// Cloning is cheap and every clone refers to the same connection. The
/// session shuts down when [`close`](Self::close) is called or when every
/// handle is dropped.
#[derive(Clone)]
pub struct Session {
    /// Shared inner state.
    inner: Arc<SessionInner>,
}

// ============================================================================
// Session - Display
// ============================================================================

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("state", &self.inner.connection.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Constructors
// ============================================================================

impl Session {
    /// Returns a builder for configuring and opening a session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Opens a session from a prepared configuration.
    ///
    /// Connecting starts in the background; the returned handle reports
    /// `connected() == false` until the transport is established. Must be
    /// called from within a tokio runtime.
    #[must_use]
    pub fn open(config: SessionConfig) -> Self {
        let endpoint = config.endpoint.clone();
        debug!(endpoint = %endpoint, "Opening evaluation session");
        let connection = Connection::open(config);
        Self {
            inner: Arc::new(SessionInner {
                endpoint,
                connection,
            }),
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the endpoint this session points at.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Returns `true` if the connection is currently open.
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.inner.connection.is_open()
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Subscribes to connection-state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }
}

// ============================================================================
// Session - Execution
// ============================================================================

impl Session {
    /// Submits source text and registers a callback for the reply.
    ///
    /// The call returns as soon as the submission is enqueued; `on_reply`
    /// is invoked later with the next decoded inbound message. Submitting
    /// again before a reply arrives drops the earlier callback: the slot
    /// holds one handler, not a queue.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not open; the
    ///   request is dropped and `on_reply` will never be invoked
    /// - [`Error::ConnectionClosed`] if the session has shut down
    pub fn run<F>(&self, source: impl Into<String>, on_reply: F) -> Result<()>
    where
        F: FnOnce(EvalReply) + Send + 'static,
    {
        self.inner.connection.submit(source, on_reply)
    }

    /// Submits source text and awaits the reply.
    ///
    /// The submission is enqueued before this returns; awaiting the
    /// returned future only waits for the reply. Equivalent to
    /// [`run`](Self::run) with a channel-backed callback, and subject to
    /// the same single-slot semantics.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] / [`Error::ConnectionClosed`] as for `run`
    /// - [`Error::ReplyDropped`] if the connection is lost, the session is
    ///   closed, or a newer submission overwrites the pending handler
    ///   before the reply arrives
    pub fn eval(
        &self,
        source: impl Into<String>,
    ) -> impl Future<Output = Result<EvalReply>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let submitted = self.run(source, move |reply| {
            let _ = tx.send(reply);
        });

        async move {
            submitted?;
            rx.await.map_err(|_| Error::ReplyDropped)
        }
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Waits until the connection is open.
    ///
    /// Returns as soon as the state becomes `Open`. Bounded by the retry
    /// policy: once the session reaches a terminal state this returns an
    /// error instead of waiting forever.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the session ends in a terminal
    /// state without ever opening again.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_open() {
                return Ok(());
            }
            if state.is_terminal() {
                return Err(Error::connection(format!(
                    "session is {state} and cannot reconnect"
                )));
            }
            if rx.changed().await.is_err() {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Waits until the connection is open, up to a deadline.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the deadline expires first
    /// - [`Error::Connection`] if the session reaches a terminal state
    pub async fn wait_connected_timeout(&self, deadline: Duration) -> Result<()> {
        timeout(deadline, self.wait_connected())
            .await
            .map_err(|_| Error::connection_timeout(deadline.as_millis() as u64))?
    }

    /// Closes the session.
    ///
    /// The connection state becomes `Closed` and any pending reply
    /// handler is dropped. Idempotent.
    pub fn close(&self) {
        debug!(endpoint = %self.inner.endpoint, "Closing session");
        self.inner.connection.shutdown();
    }
}

// ============================================================================
// SessionBuilder
// ============================================================================

/// Builder for opening sessions.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use playground_client::{RetryPolicy, Session};
///
/// # fn example() -> playground_client::Result<()> {
/// let session = Session::builder()
///     .endpoint("wss://eval.example.com/run")
///     .retry_policy(RetryPolicy::new().with_max_attempts(3))
///     .connect_timeout(Duration::from_secs(10))
///     .open()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder {
    /// Endpoint address (required).
    endpoint: Option<String>,
    /// Reconnect policy.
    retry: Option<RetryPolicy>,
    /// Per-attempt connect timeout.
    connect_timeout: Option<Duration>,
}

impl SessionBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint of the evaluation service.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the per-attempt connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    /// Validates the configuration and opens the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is missing or invalid, or
    /// the retry policy allows zero attempts.
    pub fn open(self) -> Result<Session> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::config("endpoint address is required"))?;

        let mut config = SessionConfig::new(&endpoint)?;
        if let Some(retry) = self.retry {
            config = config.with_retry_policy(retry);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            config = config.with_connect_timeout(connect_timeout);
        }
        config.validate()?;

        Ok(Session::open(config))
    }
}

// ============================================================================
// Tests
// ============================================================================
