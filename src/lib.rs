//! Playground client - async client for a remote code-evaluation service.
//!
//! This library maintains one persistent WebSocket connection to an
//! evaluation service, submits source-code payloads, and routes the
//! service's asynchronous replies back to the caller.
//!
//! # Architecture
//!
//! The client follows a client-server model:
//!
//! - **Local end (Rust)**: submits raw source text, receives JSON replies
//! - **Remote end (service)**: evaluates submissions, emits reply records
//!
//! Key design principles:
//!
//! - Each [`Session`] owns: one connection + supervisor task + event loop
//! - Submissions are raw text, one message each, with no envelope and no
//!   request identifier; replies are correlated positionally via a single
//!   reply-handler slot
//! - Non-blocking throughout: `run` enqueues and returns, replies arrive
//!   as events (callback style) or through an awaitable (`eval`)
//! - Connection state is an observable stream with bounded
//!   backoff-reconnect, not a one-shot snapshot flag
//!
//! # Quick Start
//!
//! ```no_run
//! use playground_client::{Result, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Open a session against the evaluation service
//!     let session = Session::builder()
//!         .endpoint("wss://eval.example.com/run")
//!         .open()?;
//!
//!     // Wait for the connection, then evaluate
//!     session.wait_connected().await?;
//!     let reply = session.eval("1 + 1").await?;
//!     println!("result: {}", reply.get_string("result"));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | Session handle and builder |
//! | [`config`] | Endpoint and retry configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Wire message types (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |
//!
//! # Semantics Worth Knowing
//!
//! - **Single reply slot**: submitting again before a reply arrives drops
//!   the earlier handler; the next reply goes to the latest submission.
//!   The service echoes no request identifiers, so the client cannot do
//!   better without a protocol change.
//! - **Explicit not-connected errors**: submitting while the connection
//!   is not open returns [`Error::NotConnected`] rather than silently
//!   discarding the request.
//! - **Terminal states**: once the retry budget is exhausted the session
//!   is `Closed`/`Failed` for good; open a new [`Session`] to recover.

// ============================================================================
// Modules
// ============================================================================

/// Endpoint and retry configuration.
///
/// Use [`Session::builder()`] for the common path; [`SessionConfig`] is
/// the validated form it produces.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Wire message types.
///
/// Internal module defining the decoded reply record.
pub mod protocol;

/// Evaluation sessions.
///
/// Use [`Session::builder()`] to configure and open a session.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling the connection, supervisor and event loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Session types
pub use session::{Session, SessionBuilder};

// Configuration types
pub use config::{RetryPolicy, SessionConfig};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::EvalReply;

// Transport types
pub use transport::ConnectionState;
