//! Codec trait and the JSON implementation.
//!
//! A "codec" (coder/decoder) converts between Rust values and what actually
//! travels over the wire. This client speaks WebSocket *text* frames, so a
//! codec here produces and consumes `String`s rather than raw bytes.
//!
//! Nothing above this module cares how an envelope is spelled on the wire.
//! The connection task holds "something that implements [`Codec`]", and
//! [`JsonCodec`] is the implementation the server expects today. Swapping
//! in another text format means writing one new type, not touching the
//! callers.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to frame text and decodes them back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync`: the codec can be moved to and shared across threads.
///   Tokio's multi-threaded runtime may poll the connection task on any
///   worker thread, so everything the task owns must allow that.
/// - `'static`: the codec borrows nothing temporary. The connection task
///   lives as long as the client, so the values it stores must too.
///
/// ## Generic methods
///
/// `encode` and `decode` are generic over the value type, so one codec
/// handles envelopes, auth frames, and user payloads alike:
/// - `encode<T: Serialize>`: anything serde can write becomes frame text.
/// - `decode<T: DeserializeOwned>`: frame text becomes any type serde can
///   read.
///
/// `DeserializeOwned` (rather than plain `Deserialize<'de>`) means the
/// decoded value owns its data instead of borrowing slices of the input.
/// Inbound frames are dropped as soon as they are decoded, so a borrowed
/// result would not outlive its buffer.
///
/// Because the methods are generic, `Codec` is not object safe. Callers
/// name a concrete codec (or a type parameter) instead of `dyn Codec`.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into frame text.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes frame text back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or doesn't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// JSON is what the server speaks, and it has the side benefit of being
/// readable in logs and browser dev tools when something goes wrong. It is
/// a unit struct with no state, so it is free to copy into every task that
/// needs one.
///
/// ## Example
///
/// ```rust
/// use tether_protocol::{Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let text = codec.encode(&Envelope::new("ping")).unwrap();
/// assert_eq!(text, r#"{"type":"ping"}"#);
///
/// let back: Envelope = codec.decode(&text).unwrap();
/// assert_eq!(back.kind, "ping");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Envelope;

    #[test]
    fn test_decode_rejects_missing_type() {
        let result: Result<Envelope, _> = JsonCodec.decode(r#"{"data":1}"#);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        let result: Result<Envelope, _> = JsonCodec.decode(r#"{"type":"#);
        assert!(result.is_err());
    }
}
