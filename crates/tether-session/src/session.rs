//! Session types: the connection state machine and the record of the one
//! live transport session.

use std::fmt;
use std::time::Instant;

use tether_transport::{SessionHandle, SessionId};

use tether_protocol::Envelope;

use crate::{AuthHandshake, SessionError};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the client stands, from nothing to a trusted session.
///
/// ```text
///   Disconnected ──connect──→ Connecting ──opened──→ Connected
///        ↑                                              │ (auth sent)
///        │                                              ▼
///     Closing ←──auth failure / close()── Authenticating ──auth_success──→ Authenticated
/// ```
///
/// Any state drops back to `Disconnected` when the transport closes.
/// Exactly one value holds at a time; the owner mutates it from a single
/// task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session and nothing in flight.
    #[default]
    Disconnected,
    /// Waiting for a token or for the transport to open.
    Connecting,
    /// Transport open, auth envelope not yet sent.
    Connected,
    /// Auth envelope sent, waiting for the server's verdict.
    Authenticating,
    /// The server accepted our credentials.
    Authenticated,
    /// Tear-down requested, waiting for the transport to confirm.
    Closing,
}

impl ConnectionState {
    /// Returns `true` while the transport is open.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Authenticating | Self::Authenticated
        )
    }

    /// Returns `true` once the handshake has succeeded.
    pub fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Returns `true` if a `connect()` would start a new attempt.
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The client's record of its single live transport session.
///
/// Created when a connection attempt starts, dropped when the transport
/// reports closure or a newer session replaces it.
pub struct Session {
    handle: SessionHandle,
    /// The token this attempt connected with; the handshake sends it.
    token: String,
    handshake: AuthHandshake,
    /// Set by a transport error.
    transport_errored: bool,
}

impl Session {
    /// Wraps a transport handle and the token it was opened with.
    pub fn new(handle: SessionHandle, token: impl Into<String>) -> Self {
        let handshake = AuthHandshake::new(handle.id());
        Self {
            handle,
            token: token.into(),
            handshake,
            transport_errored: false,
        }
    }

    /// The transport session's ID.
    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    /// When the session was created.
    pub fn created_at(&self) -> Instant {
        self.handle.created_at()
    }

    /// The underlying transport handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// The session's handshake.
    pub fn handshake(&self) -> &AuthHandshake {
        &self.handshake
    }

    /// Starts this session's handshake with the token it connected with.
    ///
    /// # Errors
    /// [`SessionError::HandshakeAlreadyStarted`] on a second call.
    pub fn begin_handshake(&mut self) -> Result<Envelope, SessionError> {
        self.handshake.begin(&self.token)
    }

    /// Mutable access to the session's handshake.
    pub fn handshake_mut(&mut self) -> &mut AuthHandshake {
        &mut self.handshake
    }

    /// Returns `true` if the transport reported an error on this session.
    pub fn transport_errored(&self) -> bool {
        self.transport_errored
    }

    /// Records a transport error.
    pub fn mark_errored(&mut self) {
        self.transport_errored = true;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The token stays out of logs.
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("handshake", self.handshake.state())
            .field("transport_errored", &self.transport_errored)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(ConnectionState::default().is_idle());
    }

    #[test]
    fn test_connected_projection() {
        use ConnectionState::*;
        let open = [Connected, Authenticating, Authenticated];
        let not_open = [Disconnected, Connecting, Closing];
        for s in open {
            assert!(s.is_connected(), "{s} should count as connected");
        }
        for s in not_open {
            assert!(!s.is_connected(), "{s} should not count as connected");
        }
    }

    #[test]
    fn test_authenticated_projection() {
        assert!(ConnectionState::Authenticated.is_authenticated());
        assert!(!ConnectionState::Authenticating.is_authenticated());
        assert!(!ConnectionState::Closing.is_authenticated());
    }

    #[test]
    fn test_session_handshake_is_bound_to_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, _link) = SessionHandle::pair(tx);
        let id = handle.id();
        let mut session = Session::new(handle, "t");

        assert_eq!(session.id(), id);
        assert!(!session.transport_errored());
        session.mark_errored();
        assert!(session.transport_errored());

        assert_eq!(session.begin_handshake().unwrap(), Envelope::auth("t"));
        assert!(matches!(
            session.begin_handshake(),
            Err(SessionError::HandshakeAlreadyStarted(got)) if got == id
        ));
    }
}
