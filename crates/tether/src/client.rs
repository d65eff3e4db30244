//! `ConnectionManager`: the handle the application talks to.
//!
//! The manager itself holds no connection state. It forwards commands to
//! the connection task (see `actor.rs`) and reads status back through a
//! `watch` channel. Handles are cheap to clone; the task stops when the
//! last one is dropped or [`shutdown`](ConnectionManager::shutdown) is
//! called.

use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tether_dispatch::{EventDispatcher, Handler, HandlerId};
use tether_protocol::{Envelope, Value};
use tether_session::TokenProvider;
use tether_transport::{Connector, WebSocketConnector};
use tokio::sync::{mpsc, oneshot, watch};

use crate::actor::{Command, ConnectionActor, lock_registry};
use crate::{ClientConfig, LifecycleHooks, TetherError};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// What the application may observe about the connection.
///
/// These are projections of the internal state machine; the raw state is
/// deliberately not exposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// The transport is open and healthy.
    pub connected: bool,
    /// The server has accepted our credentials on the current session.
    pub authenticated: bool,
    /// The most recent transport, token, or auth error message.
    pub last_error: Option<String>,
    /// A reconnect is scheduled.
    pub reconnect_pending: bool,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`ConnectionManager`].
///
/// # Example
///
/// ```rust,no_run
/// use tether::prelude::*;
///
/// # async fn run() -> Result<(), TetherError> {
/// let config = ClientConfig::new("ws://127.0.0.1:8000/ws")?;
/// let client = ConnectionManager::builder(config)
///     .hooks(LifecycleHooks::new().on_auth_success(|| println!("ready")))
///     .spawn(StaticToken::new("dev-token"));
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManagerBuilder<C: Connector = WebSocketConnector> {
    config: ClientConfig,
    connector: C,
    hooks: LifecycleHooks,
}

impl ConnectionManagerBuilder<WebSocketConnector> {
    /// Creates a builder using the WebSocket transport.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: WebSocketConnector::new(),
            hooks: LifecycleHooks::default(),
        }
    }
}

impl<C: Connector> ConnectionManagerBuilder<C> {
    /// Sets the lifecycle hooks.
    pub fn hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Uses a different transport.
    pub fn connector<C2: Connector>(self, connector: C2) -> ConnectionManagerBuilder<C2> {
        ConnectionManagerBuilder {
            config: self.config,
            connector,
            hooks: self.hooks,
        }
    }

    /// Starts the connection task and returns its handle. Does not connect
    /// yet; call [`ConnectionManager::connect`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<P: TokenProvider>(self, provider: P) -> ConnectionManager {
        let registry = Arc::new(Mutex::new(EventDispatcher::new()));
        let (status_tx, status_rx) = watch::channel(Status::default());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let actor = ConnectionActor::new(
            self.config,
            provider,
            self.connector,
            self.hooks,
            Arc::clone(&registry),
            status_tx,
        );
        tokio::spawn(actor.run(cmd_rx));

        ConnectionManager {
            commands: cmd_tx,
            status: status_rx,
            registry,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Handle to a persistent, authenticated, auto-reconnecting connection.
///
/// `connect()` and `close()` are idempotent, so a UI layer may call them as
/// often as it re-renders without opening duplicate sessions.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Status>,
    registry: Arc<Mutex<EventDispatcher>>,
}

impl ConnectionManager {
    /// Creates a builder.
    pub fn builder(config: ClientConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(config)
    }

    /// Spawns a WebSocket client with default hooks.
    pub fn spawn<P: TokenProvider>(config: ClientConfig, provider: P) -> Self {
        Self::builder(config).spawn(provider)
    }

    /// Spawns a client over a custom transport.
    pub fn spawn_with_connector<P: TokenProvider, C: Connector>(
        config: ClientConfig,
        provider: P,
        connector: C,
        hooks: LifecycleHooks,
    ) -> Self {
        Self::builder(config)
            .connector(connector)
            .hooks(hooks)
            .spawn(provider)
    }

    /// Starts connecting. A no-op while already connecting or connected.
    ///
    /// Returns once the request has been taken up, not when the connection
    /// is established; watch [`status`](Self::status) for that.
    pub async fn connect(&self) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Connect { reply }, rx).await
    }

    /// Closes the connection, cancels any pending reconnect, and clears all
    /// handler registrations. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Close { reply }, rx).await
    }

    /// Closes the connection and stops the connection task. Every clone of
    /// this handle becomes inert.
    pub async fn shutdown(&self) -> Result<(), TetherError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Shutdown { reply }, rx).await
    }

    /// Sends `{"type": event, "data": data}` if the session is open.
    ///
    /// Returns `false` (and logs a warning) when there is no open session.
    /// Messages are never queued for later.
    pub async fn emit(&self, event: &str, data: Option<Value>) -> bool {
        self.send(Envelope::with_data(event, data)).await
    }

    /// Like [`emit`](Self::emit) with any serializable payload.
    ///
    /// # Errors
    /// [`TetherError::Protocol`] if `data` can't be represented as JSON.
    pub async fn emit_json<T: Serialize>(&self, event: &str, data: &T) -> Result<bool, TetherError> {
        let value = serde_json::to_value(data)
            .map_err(tether_protocol::ProtocolError::Encode)?;
        Ok(self.emit(event, Some(value)).await)
    }

    /// Sends a pre-built envelope if the session is open.
    pub async fn send(&self, envelope: Envelope) -> bool {
        let (reply, rx) = oneshot::channel();
        match self.request(Command::Send { envelope, reply }, rx).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::warn!(error = %e, "dropping outbound message");
                false
            }
        }
    }

    /// Registers `handler` for envelopes of type `event` (or
    /// [`WILDCARD`](tether_dispatch::WILDCARD) for all of them).
    ///
    /// Registering the same `Arc` twice for the same event is a no-op and
    /// yields a subscription with the same ID.
    pub fn subscribe(&self, event: &str, handler: Handler) -> Subscription {
        let id = lock_registry(&self.registry).subscribe(event, handler);
        Subscription {
            event: event.to_owned(),
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Registers a closure for envelopes of type `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribe(event, Arc::new(handler))
    }

    /// Registers a closure that receives `data` decoded as `T`.
    ///
    /// Envelopes whose payload doesn't decode are logged and skipped. A
    /// missing payload is decoded from `null`.
    pub fn on_data<T, F>(&self, event: &str, handler: F) -> Subscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.on(event, move |envelope: &Envelope| {
            let raw = envelope.data.clone().unwrap_or(Value::Null);
            match serde_json::from_value::<T>(raw) {
                Ok(payload) => handler(payload),
                Err(e) => tracing::warn!(
                    event_type = %envelope.kind,
                    error = %e,
                    "payload did not match handler type"
                ),
            }
        })
    }

    /// Removes one handler (`Some(id)`) or all handlers (`None`) for
    /// `event`. Returns how many were removed.
    pub fn unsubscribe(&self, event: &str, id: Option<HandlerId>) -> usize {
        lock_registry(&self.registry).unsubscribe(event, id)
    }

    /// Returns `true` while the transport is open and healthy.
    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    /// Returns `true` once the server has accepted our credentials.
    pub fn is_authenticated(&self) -> bool {
        self.status.borrow().authenticated
    }

    /// The most recent error message, if any.
    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    /// A snapshot of the current status.
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// A receiver that is notified on every status change.
    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Waits until `predicate` holds for the status and returns it.
    ///
    /// # Errors
    /// [`TetherError::Shutdown`] if the connection task stops first.
    pub async fn wait_for_status(
        &self,
        predicate: impl FnMut(&Status) -> bool,
    ) -> Result<Status, TetherError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(predicate)
            .await
            .map_err(|_| TetherError::Shutdown)?;
        Ok(status.clone())
    }

    async fn request<T>(
        &self,
        cmd: Command,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, TetherError> {
        self.commands.send(cmd).map_err(|_| TetherError::Shutdown)?;
        rx.await.map_err(|_| TetherError::Shutdown)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A handler registration.
///
/// Dropping a `Subscription` leaves the handler registered; call
/// [`cancel`](Self::cancel) to remove it.
#[derive(Debug)]
pub struct Subscription {
    event: String,
    id: HandlerId,
    registry: Weak<Mutex<EventDispatcher>>,
}

impl Subscription {
    /// The event type this handler listens to.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The registration's ID.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Removes the handler. Returns `false` if it was already gone (for
    /// example after `close()` cleared all registrations).
    pub fn cancel(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock_registry(&registry).unsubscribe(&self.event, Some(self.id)) > 0,
            None => false,
        }
    }
}
