//! Transport session layer for Tether.
//!
//! A *session* is one physical connection attempt to the server. This crate
//! provides the pieces every transport shares:
//!
//! - [`SessionHandle`]: the owner's side, for sending text and closing.
//! - [`SessionLink`]: the transport's side, holding the [`EventSink`] it reports
//!   lifecycle signals into, and the command channel it drains.
//! - [`Connector`]: starts a connection attempt for a given URL.
//!
//! Signals flow out of the transport as [`TransportEvent`]s, each tagged with
//! the [`SessionId`] it belongs to, so the owner can ignore stragglers from a
//! session it has already replaced.
//!
//! ```text
//! SessionHandle ──(SessionCommand)──→ transport task ──(TransportEvent)──→ owner
//! ```
//!
//! # Life of a session
//!
//! 1. The owner calls [`SessionHandle::pair`], passing the sender half of
//!    its event channel. It keeps the [`SessionHandle`] and gives the
//!    [`SessionLink`] to a [`Connector`].
//! 2. The connector spawns a task that dials the URL. On success it calls
//!    [`EventSink::opened`], then forwards every inbound text frame with
//!    [`EventSink::message`].
//! 3. Meanwhile the task drains `link.commands`, writing
//!    [`SessionCommand::Send`] frames and honouring
//!    [`SessionCommand::Close`].
//! 4. However the connection ends, the task reports
//!    [`EventSink::closed`] exactly once.
//!
//! # Ownership
//!
//! The two halves never share state. The owner only holds an
//! `mpsc::UnboundedSender` for commands, and the transport task only holds
//! the sink's sender for events, so neither side needs a lock and either
//! side can go away first:
//!
//! - If the owner drops its handle, the command channel closes and the
//!   transport task sees `None` from `commands.recv()`.
//! - If the transport task dies (even by panic), its [`EventSink`] is
//!   dropped, and the `Drop` impl reports `Closed { code: 1006 }` so the
//!   owner is never left waiting.
//!
//! `EventSink::closed` takes `self` by value. The compiler therefore
//! rejects a second close report, and the owner's state machine can rely
//! on exactly one `Closed` per session.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use url::Url;

/// Normal closure: the session was torn down on purpose.
pub const CLOSE_NORMAL: u16 = 1000;

/// Going away: the peer is shutting down or navigating away.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Abnormal closure: the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new `SessionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique ID.
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// A lifecycle signal raised by a transport session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection is open and can carry frames.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// Something went wrong. Always followed by `Closed` eventually.
    Errored(String),
    /// The session is over. Fires exactly once per session.
    Closed {
        /// WebSocket close code (1000 = normal, 1006 = abnormal, ...).
        code: u16,
        /// Human-readable reason, possibly empty.
        reason: String,
    },
}

/// A [`SessionEvent`] tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// The session this signal belongs to.
    pub session: SessionId,
    /// The signal itself.
    pub event: SessionEvent,
}

/// Requests from the owner to the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Write a text frame.
    Send(String),
    /// Close the connection with the given code and reason.
    Close { code: u16, reason: String },
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Where a transport reports its lifecycle signals.
///
/// `closed` consumes the sink, so a session cannot report closure twice.
/// Dropping a sink that never reported closure emits
/// `Closed { code: 1006 }` on its behalf.
pub struct EventSink {
    session: SessionId,
    tx: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl EventSink {
    /// Creates a sink for `session` that forwards into `tx`.
    pub fn new(
        session: SessionId,
        tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            session,
            tx: Some(tx),
        }
    }

    /// The session this sink reports for.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Reports that the connection opened.
    pub fn opened(&self) {
        self.emit(SessionEvent::Opened);
    }

    /// Reports an inbound text frame.
    pub fn message(&self, text: impl Into<String>) {
        self.emit(SessionEvent::Message(text.into()));
    }

    /// Reports a transport error.
    pub fn errored(&self, diagnostic: impl Into<String>) {
        self.emit(SessionEvent::Errored(diagnostic.into()));
    }

    /// Reports closure. Consumes the sink.
    pub fn closed(mut self, code: u16, reason: impl Into<String>) {
        self.close_with(code, reason.into());
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            // The owner may already be gone; nothing to report to then.
            let _ = tx.send(TransportEvent {
                session: self.session,
                event,
            });
        }
    }

    fn close_with(&mut self, code: u16, reason: String) {
        if let Some(tx) = self.tx.take() {
            tracing::debug!(session = %self.session, code, %reason, "session closed");
            let _ = tx.send(TransportEvent {
                session: self.session,
                event: SessionEvent::Closed { code, reason },
            });
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        self.close_with(CLOSE_ABNORMAL, String::new());
    }
}

// ---------------------------------------------------------------------------
// SessionHandle / SessionLink
// ---------------------------------------------------------------------------

/// The owner's handle to a live transport session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    created_at: Instant,
    commands: mpsc::UnboundedSender<SessionCommand>,
    closing: AtomicBool,
}

/// The transport's half of a session: report into `sink`, drain `commands`.
pub struct SessionLink {
    /// Lifecycle signals go here.
    pub sink: EventSink,
    /// Sends and close requests from the owner arrive here.
    pub commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl SessionHandle {
    /// Creates a fresh session: the owner keeps the handle, the transport
    /// gets the link. Signals are forwarded into `events`.
    pub fn pair(
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> (SessionHandle, SessionLink) {
        let id = SessionId::next();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            id,
            created_at: Instant::now(),
            commands: cmd_tx,
            closing: AtomicBool::new(false),
        };
        let link = SessionLink {
            sink: EventSink::new(id, events),
            commands: cmd_rx,
        };
        (handle, link)
    }

    /// The session's unique ID.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// When the session was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns `true` once [`close`](Self::close) has been called or the
    /// transport task has gone away.
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire) || self.commands.is_closed()
    }

    /// Queues a text frame for the transport.
    pub fn send(&self, text: impl Into<String>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::SessionClosed(self.id));
        }
        self.commands
            .send(SessionCommand::Send(text.into()))
            .map_err(|_| TransportError::SessionClosed(self.id))
    }

    /// Asks the transport to close. Returns `false` if the session was
    /// already closing, in which case nothing happens.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.commands.send(SessionCommand::Close {
            code,
            reason: reason.into(),
        });
        true
    }
}

/// Starts connection attempts.
///
/// Implementations spawn whatever task drives the connection and return
/// immediately; everything after that is reported through the link's
/// [`EventSink`].
pub trait Connector: Send + Sync + 'static {
    /// Begins connecting to `url`, reporting through `link`.
    fn open(&self, url: Url, link: SessionLink);
}
