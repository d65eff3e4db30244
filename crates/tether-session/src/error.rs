//! Error types for the session layer.

use tether_transport::SessionId;

/// Errors that can occur while obtaining credentials or running the
/// authentication handshake.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`TokenProvider`](crate::TokenProvider) couldn't supply a token.
    /// The connection attempt is abandoned; no retry is scheduled.
    #[error("token unavailable: {0}")]
    TokenUnavailable(String),

    /// A second handshake was attempted on the same session.
    #[error("handshake already started on {0}")]
    HandshakeAlreadyStarted(SessionId),
}
