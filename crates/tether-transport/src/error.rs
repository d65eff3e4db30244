use crate::SessionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The session is closed (or closing) and can no longer send.
    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    /// The outbound connection could not be established.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Writing a frame to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Reading from the socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}
