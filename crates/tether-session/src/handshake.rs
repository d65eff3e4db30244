//! The post-connect authentication handshake.
//!
//! ```text
//!   Pending ──begin()──→ AwaitingReply ──accept()──→ Accepted
//!      │                      │                          │
//!      └──────────────────────┴───────reject()───────────┴──→ Rejected
//! ```
//!
//! One handshake belongs to one transport session. `begin` can only run
//! once; a reconnect gets a brand-new session and therefore a brand-new
//! handshake.

use tether_protocol::Envelope;
use tether_transport::SessionId;

use crate::SessionError;

/// Where a session's handshake stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet.
    Pending,
    /// Auth envelope sent, waiting for the server's verdict.
    AwaitingReply,
    /// The server accepted the token.
    Accepted,
    /// The server rejected the token (with its message).
    Rejected(String),
}

/// Drives the auth exchange for a single session.
#[derive(Debug)]
pub struct AuthHandshake {
    session: SessionId,
    state: HandshakeState,
}

impl AuthHandshake {
    /// A fresh handshake for `session`.
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            state: HandshakeState::Pending,
        }
    }

    /// Current state.
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Returns `true` once the server has accepted the token.
    pub fn is_accepted(&self) -> bool {
        matches!(self.state, HandshakeState::Accepted)
    }

    /// Builds the auth envelope for `token` and marks the handshake as
    /// started.
    ///
    /// # Errors
    /// [`SessionError::HandshakeAlreadyStarted`] if called more than once.
    pub fn begin(&mut self, token: &str) -> Result<Envelope, SessionError> {
        if self.state != HandshakeState::Pending {
            return Err(SessionError::HandshakeAlreadyStarted(self.session));
        }
        self.state = HandshakeState::AwaitingReply;
        tracing::debug!(session = %self.session, "auth handshake started");
        Ok(Envelope::auth(token))
    }

    /// Records an `auth_success`. Returns `true` only for the first success
    /// after `begin`; duplicates and out-of-order successes are ignored.
    pub fn accept(&mut self) -> bool {
        if self.state != HandshakeState::AwaitingReply {
            return false;
        }
        self.state = HandshakeState::Accepted;
        true
    }

    /// Records a rejection. Returns `false` if the handshake was already
    /// rejected.
    pub fn reject(&mut self, message: impl Into<String>) -> bool {
        if matches!(self.state, HandshakeState::Rejected(_)) {
            return false;
        }
        self.state = HandshakeState::Rejected(message.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake() -> AuthHandshake {
        AuthHandshake::new(SessionId::new(1))
    }

    #[test]
    fn test_begin_builds_auth_envelope() {
        let mut hs = handshake();
        let env = hs.begin("tok").unwrap();
        assert_eq!(env, Envelope::auth("tok"));
        assert_eq!(hs.state(), &HandshakeState::AwaitingReply);
    }

    #[test]
    fn test_begin_only_once() {
        let mut hs = handshake();
        hs.begin("tok").unwrap();
        assert!(matches!(
            hs.begin("tok"),
            Err(SessionError::HandshakeAlreadyStarted(id)) if id == SessionId::new(1)
        ));
    }

    #[test]
    fn test_accept_fires_once() {
        let mut hs = handshake();
        hs.begin("tok").unwrap();
        assert!(hs.accept());
        assert!(!hs.accept(), "second success is ignored");
        assert!(hs.is_accepted());
    }

    #[test]
    fn test_accept_before_begin_is_ignored() {
        let mut hs = handshake();
        assert!(!hs.accept());
        assert_eq!(hs.state(), &HandshakeState::Pending);
    }

    #[test]
    fn test_reject_after_accept_revokes() {
        let mut hs = handshake();
        hs.begin("tok").unwrap();
        hs.accept();
        assert!(hs.reject("revoked"));
        assert!(!hs.is_accepted());
        assert!(!hs.reject("again"));
        assert_eq!(hs.state(), &HandshakeState::Rejected("revoked".into()));
    }
}
