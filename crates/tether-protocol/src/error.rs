//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding envelopes.
///
/// None of these are fatal to a connection: the client logs a bad
/// inbound frame and moves on to the next one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into text).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: not JSON, truncated, or the wrong shape.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Valid JSON that isn't a usable envelope (e.g. an array or a bare
    /// string where an object was expected).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
