//! The connection task: the single owner of all connection state.
//!
//! Everything that can change the client's state arrives here as a message
//! and is handled to completion before the next one:
//!
//! - commands from [`ConnectionManager`](crate::ConnectionManager) handles
//! - transport signals from the live session
//! - token fetch results
//! - the reconnect timer
//!
//! Because there is exactly one task, state transitions and handler
//! dispatch never interleave, and envelopes reach subscribers in the order
//! the transport delivered them.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use tether_dispatch::{EventDispatcher, invoke_all};
use tether_protocol::{Codec, Envelope, Inbound, JsonCodec};
use tether_reconnect::ReconnectPolicy;
use tether_session::{ConnectionState, Session, SessionError, TokenProvider};
use tether_transport::{
    CLOSE_GOING_AWAY, CLOSE_NORMAL, Connector, SessionEvent, SessionHandle,
    TransportEvent,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::{ClientConfig, LifecycleHooks, Status};

/// Requests from handles to the connection task.
pub(crate) enum Command {
    Connect { reply: oneshot::Sender<()> },
    Send { envelope: Envelope, reply: oneshot::Sender<bool> },
    Close { reply: oneshot::Sender<()> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// A token fetch result, tagged with the attempt that asked for it.
struct TokenFetched {
    attempt: u64,
    result: Result<String, SessionError>,
}

/// Locks the shared handler registry. Handlers never run under this lock,
/// so a poisoned guard still holds a consistent map.
pub(crate) fn lock_registry(
    registry: &Mutex<EventDispatcher>,
) -> MutexGuard<'_, EventDispatcher> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct ConnectionActor<P: TokenProvider, C: Connector> {
    config: ClientConfig,
    provider: Arc<P>,
    connector: C,
    hooks: LifecycleHooks,
    codec: JsonCodec,
    registry: Arc<Mutex<EventDispatcher>>,
    status_tx: watch::Sender<Status>,

    state: ConnectionState,
    /// The one live session, if any.
    session: Option<Session>,
    policy: ReconnectPolicy,
    last_error: Option<String>,

    /// Bumped on every new attempt and on close; stale token results are
    /// recognised by a mismatched number.
    attempt: u64,
    token_task: Option<JoinHandle<()>>,

    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    token_tx: mpsc::UnboundedSender<TokenFetched>,
    token_rx: mpsc::UnboundedReceiver<TokenFetched>,
}

impl<P: TokenProvider, C: Connector> ConnectionActor<P, C> {
    pub(crate) fn new(
        config: ClientConfig,
        provider: P,
        connector: C,
        hooks: LifecycleHooks,
        registry: Arc<Mutex<EventDispatcher>>,
        status_tx: watch::Sender<Status>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (token_tx, token_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::new(config.reconnect_config().clone());
        Self {
            config,
            provider: Arc::new(provider),
            connector,
            hooks,
            codec: JsonCodec,
            registry,
            status_tx,
            state: ConnectionState::Disconnected,
            session: None,
            policy,
            last_error: None,
            attempt: 0,
            token_task: None,
            events_tx,
            events_rx,
            token_tx,
            token_rx,
        }
    }

    /// Runs until shut down or every handle is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!(endpoint = %self.config.endpoint(), "connection task started");

        loop {
            tokio::select! {
                biased;

                cmd = commands.recv() => {
                    match cmd {
                        Some(Command::Shutdown { reply }) => {
                            self.close("Client shut down", CLOSE_GOING_AWAY);
                            self.publish();
                            let _ = reply.send(());
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            self.close("Client dropped", CLOSE_GOING_AWAY);
                            break;
                        }
                    }
                }

                Some(ev) = self.events_rx.recv() => self.handle_transport(ev),

                Some(fetched) = self.token_rx.recv() => self.handle_token(fetched),

                _ = self.policy.wait_for_fire() => {
                    if self.state.is_idle() {
                        tracing::info!("attempting to reconnect");
                        self.start_attempt();
                    }
                }
            }
            self.publish();
        }

        self.publish();
        tracing::debug!("connection task stopped");
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Callers see the resulting status as soon as their reply arrives.
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => {
                self.connect();
                self.publish();
                let _ = reply.send(());
            }
            Command::Send { envelope, reply } => {
                let _ = reply.send(self.send(&envelope));
            }
            Command::Close { reply } => {
                self.close("Manual close", CLOSE_NORMAL);
                self.publish();
                let _ = reply.send(());
            }
            // Handled in `run`, which owns the loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn connect(&mut self) {
        match self.state {
            ConnectionState::Disconnected => {}
            // A rejected session may take a while to confirm its close.
            // Detach it; its late signals no longer match a live session.
            ConnectionState::Closing => {
                if let Some(session) = self.session.take() {
                    tracing::debug!(session = %session.id(), "abandoning closing session");
                }
            }
            _ => {
                tracing::debug!(state = %self.state, "connect ignored, already active");
                return;
            }
        }
        // A user-initiated connect supersedes any scheduled retry.
        self.policy.cancel();
        self.start_attempt();
    }

    /// Starts a connection attempt: fetch a fresh token off-task, then open.
    fn start_attempt(&mut self) {
        self.attempt += 1;
        let attempt = self.attempt;
        self.state = ConnectionState::Connecting;

        let provider = Arc::clone(&self.provider);
        let tx = self.token_tx.clone();
        self.token_task = Some(tokio::spawn(async move {
            let result = match AssertUnwindSafe(provider.fetch_token()).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(SessionError::TokenUnavailable(
                    "token provider panicked".into(),
                )),
            };
            let _ = tx.send(TokenFetched { attempt, result });
        }));
        tracing::debug!(attempt, "fetching token");
    }

    fn send(&mut self, envelope: &Envelope) -> bool {
        let Some(session) = self.session.as_ref().filter(|_| self.is_open()) else {
            tracing::warn!(
                event_type = %envelope.kind,
                "not connected, dropping outbound message"
            );
            return false;
        };
        let text = match self.codec.encode(envelope) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(event_type = %envelope.kind, error = %e, "encode failed");
                return false;
            }
        };
        match session.handle().send(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(event_type = %envelope.kind, error = %e, "send failed");
                false
            }
        }
    }

    /// Tears everything down: timer, in-flight token fetch, session,
    /// handler registrations.
    fn close(&mut self, reason: &str, code: u16) {
        if self.policy.cancel() {
            tracing::debug!("pending reconnect cancelled by close");
        }
        if let Some(task) = self.token_task.take() {
            task.abort();
        }
        self.attempt += 1;
        lock_registry(&self.registry).clear();

        if let Some(session) = self.session.take() {
            self.state = ConnectionState::Closing;
            let id = session.id();
            session.handle().close(code, reason);
            tracing::info!(session = %id, code, reason, "session closed");
            self.hooks.disconnected(reason);
        }
        self.state = ConnectionState::Disconnected;
    }

    // -----------------------------------------------------------------------
    // Token results
    // -----------------------------------------------------------------------

    fn handle_token(&mut self, fetched: TokenFetched) {
        if fetched.attempt != self.attempt || self.state != ConnectionState::Connecting {
            tracing::debug!(attempt = fetched.attempt, "discarding stale token result");
            return;
        }
        self.token_task = None;

        let token = match fetched.result {
            Ok(token) => token,
            Err(e) => {
                // No retry: only a transport close schedules one.
                let message = e.to_string();
                tracing::warn!(error = %message, "token fetch failed, connect aborted");
                self.hooks.errored(&message);
                self.last_error = Some(message);
                self.state = ConnectionState::Disconnected;
                return;
            }
        };

        let url = self.config.connect_url(&token);
        let (handle, link) = SessionHandle::pair(self.events_tx.clone());
        let session = Session::new(handle, token);
        tracing::debug!(session = %session.id(), endpoint = %self.config.endpoint(), "opening session");
        self.session = Some(session);
        self.connector.open(url, link);
    }

    // -----------------------------------------------------------------------
    // Transport signals
    // -----------------------------------------------------------------------

    fn handle_transport(&mut self, ev: TransportEvent) {
        if self.session.as_ref().map(Session::id) != Some(ev.session) {
            tracing::debug!(session = %ev.session, "ignoring signal from detached session");
            return;
        }

        match ev.event {
            SessionEvent::Opened => self.on_opened(),
            SessionEvent::Message(text) => self.on_frame(&text),
            SessionEvent::Errored(message) => {
                tracing::warn!(session = %ev.session, error = %message, "transport error");
                if let Some(session) = self.session.as_mut() {
                    session.mark_errored();
                }
                self.hooks.errored(&message);
                self.last_error = Some(message);
            }
            SessionEvent::Closed { code, reason } => self.on_closed(code, reason),
        }
    }

    fn on_opened(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let id = session.id();
        tracing::info!(session = %id, "connected");
        self.state = ConnectionState::Connected;
        self.last_error = None;
        self.hooks.connected();

        // The auth envelope goes out before anything else on this session.
        let envelope = match session.begin_handshake() {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "handshake not started");
                return;
            }
        };
        match self.codec.encode(&envelope) {
            Ok(text) => {
                if let Err(e) = session.handle().send(text) {
                    tracing::warn!(session = %id, error = %e, "auth envelope not sent");
                }
            }
            Err(e) => tracing::warn!(session = %id, error = %e, "auth envelope not encoded"),
        }
        self.state = ConnectionState::Authenticating;
    }

    fn on_frame(&mut self, text: &str) {
        let inbound = match Inbound::parse(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!(error = %e, len = text.len(), "dropping malformed frame");
                return;
            }
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match inbound {
            Inbound::AuthSuccess => {
                if session.handshake_mut().accept() {
                    tracing::info!(session = %session.id(), "authenticated");
                    self.state = ConnectionState::Authenticated;
                    self.hooks.auth_succeeded();
                } else {
                    tracing::debug!(session = %session.id(), "ignoring repeated auth_success");
                }
            }
            Inbound::AuthRejected(message) => {
                if !session.handshake_mut().reject(message.clone()) {
                    return;
                }
                // Terminal for this session: close normally so no retry is
                // scheduled when the transport confirms.
                tracing::warn!(session = %session.id(), reason = %message, "authentication rejected");
                session.handle().close(CLOSE_NORMAL, "Authentication failed");
                self.state = ConnectionState::Closing;
                self.hooks.auth_failed(&message);
                self.last_error = Some(message);
            }
            Inbound::Event(envelope) => {
                if self.state != ConnectionState::Authenticated {
                    tracing::debug!(
                        event_type = %envelope.kind,
                        "discarding event received before authentication"
                    );
                    return;
                }
                // Snapshot the handlers, then run them without the lock so a
                // handler may subscribe or unsubscribe.
                let handlers = lock_registry(&self.registry).handlers_for(&envelope);
                let completed = invoke_all(&handlers, &envelope);
                tracing::trace!(event_type = %envelope.kind, handlers = handlers.len(), completed, "dispatched");
            }
        }
    }

    fn on_closed(&mut self, code: u16, reason: String) {
        let Some(session) = self.session.take() else {
            return;
        };
        let intentional = self.state == ConnectionState::Closing;
        self.state = ConnectionState::Disconnected;

        let reason = if reason.is_empty() {
            format!("Connection closed with code {code}")
        } else {
            reason
        };
        tracing::info!(
            session = %session.id(),
            code,
            %reason,
            uptime_ms = session.created_at().elapsed().as_millis() as u64,
            "disconnected"
        );
        self.hooks.disconnected(&reason);

        if intentional {
            tracing::debug!(session = %session.id(), "closed on purpose, not reconnecting");
        } else {
            self.policy.on_closed(code);
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// The transport is open and hasn't reported an error.
    fn is_open(&self) -> bool {
        self.state.is_connected()
            && self
                .session
                .as_ref()
                .is_some_and(|s| !s.transport_errored() && !s.handle().is_closed())
    }

    fn publish(&self) {
        let next = Status {
            connected: self.is_open(),
            authenticated: self.state.is_authenticated(),
            last_error: self.last_error.clone(),
            reconnect_pending: self.policy.is_pending(),
        };
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
