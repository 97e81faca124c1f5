//! WebSocket connection, supervisor and event loop.
//!
//! This module handles the connection to the evaluation service, including
//! submission writes, reply routing and the reconnect loop.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Dialing the endpoint, with bounded exponential-backoff reconnects
//! - Outgoing submissions from the Rust API
//! - Incoming replies, decoded and delivered to the pending handler
//!
//! # Reply Correlation
//!
//! There is none on the wire: submissions carry no identifier and replies
//! echo none. A single reply-handler slot holds the most recent
//! submission's handler, and the next decoded inbound message is delivered
//! to it. Submitting again before a reply arrives overwrites the slot, so
//! an earlier submission's reply can be delivered to a later submission's
//! handler. This is the service's protocol contract, not an oversight;
//! see [`Connection::submit`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::protocol::EvalReply;

use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// The client-side WebSocket stream type.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reply handler callback type.
///
/// Invoked at most once, with the decoded record of the next inbound
/// message after the submission that stored it.
pub type ReplyHandler = Box<dyn FnOnce(EvalReply) + Send + 'static>;

/// The single reply-handler slot, shared between the submission path and
/// the event loop's inbound routing.
type ReplySlot = Arc<Mutex<Option<ReplyHandler>>>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write a submission to the transport.
    Submit {
        /// Raw source text; sent verbatim as one message.
        source: String,
    },
    /// Shut down the connection.
    Shutdown,
}

// ============================================================================
// SessionEnd
// ============================================================================

/// Reason an open session's event loop ended.
enum SessionEnd {
    /// Close frame or EOF from the remote end.
    RemoteClosed,
    /// Transport-level error (failed read or write).
    TransportError,
    /// Caller shutdown, or every handle was dropped.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Connection to the evaluation service.
///
/// Handles submission writes, reply routing and reconnects. The connection
/// spawns an internal supervisor task; handles are cheap to clone and all
/// operations are non-blocking.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks. The
/// reply-handler slot is lock-protected, so slot replacement is atomic
/// with respect to inbound delivery.
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Observable connection state (written by the supervisor).
    state_rx: watch::Receiver<ConnectionState>,
    /// Reply-handler slot (shared with the event loop).
    pending: ReplySlot,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            state_rx: self.state_rx.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl Connection {
    /// Opens a connection governed by the given configuration.
    ///
    /// Spawns the supervisor task and returns immediately; use
    /// [`subscribe`](Self::subscribe) or [`state`](Self::state) to observe
    /// when the connection becomes open. Must be called from within a
    /// tokio runtime.
    pub(crate) fn open(config: SessionConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let pending: ReplySlot = Arc::new(Mutex::new(None));

        tokio::spawn(Self::run_supervisor(
            config,
            state_tx,
            command_rx,
            Arc::clone(&pending),
        ));

        Self {
            command_tx,
            state_rx,
            pending,
        }
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Returns `true` if the connection is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Subscribes to connection-state transitions.
    ///
    /// The receiver yields every state the supervisor publishes from now
    /// on; the current state is available immediately via `borrow`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Returns `true` if a reply handler is waiting for an inbound message.
    #[inline]
    #[must_use]
    pub fn has_pending_reply(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Submits source text for evaluation.
    ///
    /// Stores `on_reply` in the reply-handler slot (overwriting and
    /// dropping any handler already there), then writes `source` verbatim
    /// as a single outbound message. The handler is invoked with the next
    /// decoded inbound message.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not open; the
    ///   request is dropped, nothing is stored and nothing is written
    /// - [`Error::ConnectionClosed`] if the supervisor task is gone
    pub fn submit<F>(&self, source: impl Into<String>, on_reply: F) -> Result<()>
    where
        F: FnOnce(EvalReply) + Send + 'static,
    {
        let state = self.state();
        if !state.is_open() {
            warn!(%state, "Submission dropped: not connected");
            return Err(Error::not_connected(state));
        }

        // Store the handler before the write so a fast reply cannot race
        // past it.
        {
            let mut slot = self.pending.lock();
            if slot.replace(Box::new(on_reply)).is_some() {
                debug!("Pending reply handler overwritten by new submission");
            }
        }

        let command = ConnectionCommand::Submit {
            source: source.into(),
        };
        if self.command_tx.send(command).is_err() {
            self.pending.lock().take();
            return Err(Error::ConnectionClosed);
        }

        Ok(())
    }

    /// Shuts down the connection.
    ///
    /// The state becomes `Closed` and any pending reply handler is
    /// dropped. Dropping every `Connection` handle has the same effect.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }
}

// ============================================================================
// Connection - Supervisor
// ============================================================================

impl Connection {
    /// Connect/retry loop owning the transport and the state channel.
    async fn run_supervisor(
        config: SessionConfig,
        state_tx: watch::Sender<ConnectionState>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        pending: ReplySlot,
    ) {
        let mut attempts: u32 = 0;
        let mut delay = config.retry.initial_backoff;

        loop {
            attempts += 1;
            state_tx.send_replace(ConnectionState::Connecting);
            info!(
                endpoint = %config.endpoint,
                attempt = attempts,
                "Connecting to evaluation service"
            );

            let connect = timeout(
                config.connect_timeout,
                connect_async(config.endpoint.as_str()),
            )
            .await;

            let end = match connect {
                Ok(Ok((ws_stream, _response))) => {
                    info!(endpoint = %config.endpoint, "Connected to evaluation service");
                    delay = config.retry.initial_backoff;
                    state_tx.send_replace(ConnectionState::Open);
                    let end = Self::run_session(ws_stream, &mut command_rx, &pending).await;
                    Self::drop_pending_reply(&pending);
                    end
                }
                Ok(Err(e)) => {
                    warn!(endpoint = %config.endpoint, error = %e, "Unable to connect");
                    SessionEnd::TransportError
                }
                Err(_) => {
                    warn!(
                        endpoint = %config.endpoint,
                        timeout_ms = config.connect_timeout.as_millis() as u64,
                        "Connect attempt timed out"
                    );
                    SessionEnd::TransportError
                }
            };

            let terminal = match end {
                SessionEnd::Shutdown => Some(ConnectionState::Closed),
                SessionEnd::RemoteClosed if attempts >= config.retry.max_attempts => {
                    Some(ConnectionState::Closed)
                }
                SessionEnd::TransportError if attempts >= config.retry.max_attempts => {
                    Some(ConnectionState::Failed)
                }
                _ => None,
            };

            if let Some(state) = terminal {
                if state == ConnectionState::Failed {
                    error!(
                        endpoint = %config.endpoint,
                        attempts,
                        "Giving up on evaluation service"
                    );
                } else {
                    debug!(endpoint = %config.endpoint, "Session closed");
                }
                state_tx.send_replace(state);
                return;
            }

            // Backoff before re-entering Connecting; shutdown interrupts
            // the wait.
            debug!(
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after backoff"
            );
            let backoff = sleep(delay);
            tokio::pin!(backoff);
            loop {
                tokio::select! {
                    _ = &mut backoff => break,

                    command = command_rx.recv() => match command {
                        Some(ConnectionCommand::Submit { .. }) => {
                            warn!("Submission dropped: connection lost before it could be written");
                            Self::drop_pending_reply(&pending);
                        }

                        Some(ConnectionCommand::Shutdown) | None => {
                            state_tx.send_replace(ConnectionState::Closed);
                            return;
                        }
                    }
                }
            }
            delay = config.retry.next_delay(delay);
        }
    }

    /// Event loop for one open session.
    ///
    /// Runs until the transport closes, errors, or a shutdown is
    /// requested.
    async fn run_session(
        ws_stream: WsStream,
        command_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
        pending: &ReplySlot,
    ) -> SessionEnd {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from the service
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::route_reply(text.as_str(), pending);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            return SessionEnd::RemoteClosed;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            return SessionEnd::TransportError;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            return SessionEnd::RemoteClosed;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Submissions from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Submit { source }) => {
                            trace!(bytes = source.len(), "Writing submission");
                            if let Err(e) = ws_write.send(Message::Text(source.into())).await {
                                error!(error = %e, "Failed to write submission");
                                return SessionEnd::TransportError;
                            }
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            return SessionEnd::Shutdown;
                        }

                        None => {
                            debug!("All connection handles dropped");
                            let _ = ws_write.close().await;
                            return SessionEnd::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Decodes an inbound message and delivers it to the pending handler.
    ///
    /// A message that fails to decode is discarded and the slot is left
    /// untouched, so a later well-formed reply still reaches the handler.
    fn route_reply(text: &str, pending: &ReplySlot) {
        match EvalReply::from_text(text) {
            Ok(reply) => {
                // Take the handler out under the lock, invoke it outside.
                let handler = pending.lock().take();
                if let Some(handler) = handler {
                    debug!("Received reply from evaluation service");
                    handler(reply);
                } else {
                    warn!("Reply received with no pending submission");
                }
            }
            Err(e) => {
                warn!(error = %e, "Discarding undecodable reply");
            }
        }
    }

    /// Drops the pending reply handler, if any.
    ///
    /// Called when a session ends: an awaitable submission observes this
    /// as `ReplyDropped` instead of waiting forever.
    fn drop_pending_reply(pending: &ReplySlot) {
        if pending.lock().take().is_some() {
            debug!("Dropped pending reply handler");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
    use tokio_tungstenite::accept_async;

    use crate::config::RetryPolicy;

    /// Overall deadline for every await in these tests.
    const DEADLINE: Duration = Duration::from_secs(5);

    async fn bind_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        (listener, format!("ws://{addr}"))
    }

    fn test_config(url: &str, retry: RetryPolicy) -> SessionConfig {
        SessionConfig::new(url)
            .expect("valid endpoint")
            .with_retry_policy(
                retry
                    .with_initial_backoff(Duration::from_millis(10))
                    .with_max_backoff(Duration::from_millis(40)),
            )
            .with_connect_timeout(DEADLINE)
    }

    async fn wait_for_state(mut rx: watch::Receiver<ConnectionState>, want: ConnectionState) {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            if rx.changed().await.is_err() {
                assert_eq!(
                    *rx.borrow(),
                    want,
                    "state channel closed before reaching target"
                );
                return;
            }
        }
    }

    fn capture(tx: UnboundedSender<EvalReply>) -> impl FnOnce(EvalReply) + Send + 'static {
        move |reply| {
            let _ = tx.send(reply);
        }
    }

    #[tokio::test]
    async fn test_submit_writes_source_verbatim_and_routes_reply() {
        let (listener, url) = bind_server().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            let received = ws
                .next()
                .await
                .expect("client message")
                .expect("frame")
                .into_text()
                .expect("text frame")
                .as_str()
                .to_string();
            ws.send(Message::Text(r#"{"result":"2"}"#.into()))
                .await
                .expect("send reply");
            received
        });

        let connection = Connection::open(test_config(&url, RetryPolicy::disabled()));
        timeout(
            DEADLINE,
            wait_for_state(connection.subscribe(), ConnectionState::Open),
        )
        .await
        .expect("open timeout");

        let (tx, mut rx) = unbounded_channel();
        connection.submit("1+1", capture(tx)).expect("submit");

        let reply = timeout(DEADLINE, rx.recv())
            .await
            .expect("reply timeout")
            .expect("reply");
        assert_eq!(reply.get_string("result"), "2");
        assert!(!connection.has_pending_reply());

        // Exactly one outbound message, body equal to the source.
        let received = server.await.expect("server task");
        assert_eq!(received, "1+1");
    }

    #[tokio::test]
    async fn test_submit_while_connecting_is_rejected_without_write() {
        // Bound but never accepted: the WebSocket handshake stays pending
        // and the connection never opens.
        let (_listener, url) = bind_server().await;

        let connection = Connection::open(test_config(&url, RetryPolicy::disabled()));
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert!(!connection.is_open());

        let (tx, mut rx) = unbounded_channel();
        let err = connection.submit("1+1", capture(tx)).unwrap_err();
        assert!(matches!(
            err,
            Error::NotConnected {
                state: ConnectionState::Connecting
            }
        ));

        // Handler was never stored, so nothing can ever invoke it.
        assert!(!connection.has_pending_reply());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_reply_is_discarded_and_session_survives() {
        let (listener, url) = bind_server().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            let _ = ws.next().await.expect("client message").expect("frame");
            ws.send(Message::Text("{not json".into()))
                .await
                .expect("send garbage");
            ws.send(Message::Text(r#"{"ok":true}"#.into()))
                .await
                .expect("send reply");
            // Hold the connection open until the client is done.
            let _ = ws.next().await;
        });

        let connection = Connection::open(test_config(&url, RetryPolicy::disabled()));
        timeout(
            DEADLINE,
            wait_for_state(connection.subscribe(), ConnectionState::Open),
        )
        .await
        .expect("open timeout");

        let (tx, mut rx) = unbounded_channel();
        connection.submit("def f = 1", capture(tx)).expect("submit");

        // The garbage message is skipped; the next well-formed one is
        // delivered to the still-pending handler.
        let reply = timeout(DEADLINE, rx.recv())
            .await
            .expect("reply timeout")
            .expect("reply");
        assert!(reply.get_bool("ok"));
        assert!(connection.is_open());

        connection.shutdown();
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn test_second_submission_overwrites_first_handler() {
        let (listener, url) = bind_server().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            // Receive both submissions before replying once.
            for _ in 0..2 {
                let _ = ws.next().await.expect("client message").expect("frame");
            }
            ws.send(Message::Text(r#"{"seq":1}"#.into()))
                .await
                .expect("send reply");
            let _ = ws.next().await;
        });

        let connection = Connection::open(test_config(&url, RetryPolicy::disabled()));
        timeout(
            DEADLINE,
            wait_for_state(connection.subscribe(), ConnectionState::Open),
        )
        .await
        .expect("open timeout");

        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        connection.submit("first", capture(tx_a)).expect("submit A");
        connection.submit("second", capture(tx_b)).expect("submit B");

        // The slot was overwritten: the one reply goes to the second
        // handler, the first is never invoked.
        let reply = timeout(DEADLINE, rx_b.recv())
            .await
            .expect("reply timeout")
            .expect("reply");
        assert_eq!(reply.get_u64("seq"), 1);
        assert!(rx_a.try_recv().is_err());
        assert!(!connection.has_pending_reply());

        connection.shutdown();
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn test_reconnects_after_lost_session() {
        let (listener, url) = bind_server().await;

        let server = tokio::spawn(async move {
            // First session: handshake, then drop immediately.
            let (stream, _) = listener.accept().await.expect("accept 1");
            let ws = accept_async(stream).await.expect("handshake 1");
            drop(ws);

            // Second session: reply to one submission.
            let (stream, _) = listener.accept().await.expect("accept 2");
            let mut ws = accept_async(stream).await.expect("handshake 2");
            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(_))) => {
                        ws.send(Message::Text(r#"{"conn":2}"#.into()))
                            .await
                            .expect("send reply");
                        break;
                    }
                    Some(Ok(_)) => {}
                    _ => panic!("second session ended before a submission"),
                }
            }
            let _ = ws.next().await;
        });

        let connection = Connection::open(test_config(
            &url,
            RetryPolicy::new().with_max_attempts(5),
        ));
        timeout(
            DEADLINE,
            wait_for_state(connection.subscribe(), ConnectionState::Open),
        )
        .await
        .expect("open timeout");

        // Keep submitting until a submission lands on the second session;
        // attempts made while reconnecting are rejected, and one racing
        // onto the dying first session simply loses its handler.
        let (tx, mut rx) = unbounded_channel();
        let reply = timeout(DEADLINE, async {
            loop {
                if connection.submit("ping", capture(tx.clone())).is_ok() {
                    if let Ok(Some(reply)) =
                        timeout(Duration::from_millis(200), rx.recv()).await
                    {
                        return reply;
                    }
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("reconnect timeout");

        assert_eq!(reply.get_u64("conn"), 2);
        connection.shutdown();
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_in_failed() {
        // Bind to learn a free port, then drop the listener so every
        // connect attempt is refused.
        let (listener, url) = bind_server().await;
        drop(listener);

        let connection = Connection::open(test_config(
            &url,
            RetryPolicy::new().with_max_attempts(2),
        ));
        timeout(
            DEADLINE,
            wait_for_state(connection.subscribe(), ConnectionState::Failed),
        )
        .await
        .expect("failed timeout");

        assert!(connection.state().is_terminal());

        let (tx, _rx) = unbounded_channel();
        let err = connection.submit("1+1", capture(tx)).unwrap_err();
        assert!(matches!(
            err,
            Error::NotConnected {
                state: ConnectionState::Failed
            }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_moves_state_to_closed() {
        let (listener, url) = bind_server().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(stream).await.expect("handshake");
            // Serve until the client closes.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let connection = Connection::open(test_config(&url, RetryPolicy::new()));
        timeout(
            DEADLINE,
            wait_for_state(connection.subscribe(), ConnectionState::Open),
        )
        .await
        .expect("open timeout");

        connection.shutdown();
        timeout(
            DEADLINE,
            wait_for_state(connection.subscribe(), ConnectionState::Closed),
        )
        .await
        .expect("closed timeout");

        server.await.expect("server task");
    }
}
