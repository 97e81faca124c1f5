//! WebSocket transport layer.
//!
//! This module owns the persistent connection to the evaluation service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                             ┌──────────────────┐
//! │  Session (Rust)  │                             │  Evaluation      │
//! │                  │          WebSocket          │  Service         │
//! │  Connection ─────│◄───────────────────────────►│                  │
//! │  (supervisor     │       ws://HOST:PORT        │  runs submitted  │
//! │   task)          │                             │  source          │
//! └──────────────────┘                             └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. [`Connection`] is created with a validated [`SessionConfig`]
//! 2. A supervisor task dials the endpoint (state `Connecting`)
//! 3. On success the state becomes `Open`; submissions are accepted
//! 4. A lost connection re-enters `Connecting` with bounded backoff
//! 5. Exhausted retries or an explicit shutdown end in `Closed`/`Failed`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection handle, supervisor and event loop |
//! | `state` | Connection lifecycle state |
//!
//! [`SessionConfig`]: crate::SessionConfig

// ============================================================================
// Submodules
// ============================================================================

/// Connection handle, supervisor and event loop.
pub mod connection;

/// Connection lifecycle state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, ReplyHandler};
pub use state::ConnectionState;
