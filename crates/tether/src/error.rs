//! Unified error type for the Tether client.

use tether_protocol::ProtocolError;

/// Errors returned by the [`ConnectionManager`](crate::ConnectionManager)
/// API and by configuration loading.
///
/// Most runtime failures (dropped frames, handler panics, sends while
/// disconnected) never reach the caller at all; they are logged and
/// reflected in [`Status`](crate::Status). What's left is configuration
/// mistakes and talking to a client that has shut down.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The client configuration is invalid.
    #[error("invalid config: {0}")]
    Config(String),

    /// The connection manager's task has stopped.
    #[error("connection manager has shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let tether_err: TetherError = err.into();
        assert!(matches!(tether_err, TetherError::Protocol(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = TetherError::Config("TETHER_ENDPOINT is not set".into());
        assert_eq!(err.to_string(), "invalid config: TETHER_ENDPOINT is not set");
    }
}
