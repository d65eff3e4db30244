//! Classification of server → client frames.
//!
//! Every inbound frame is one of three things:
//!
//! ```text
//! {"type":"auth_success"}                      → Inbound::AuthSuccess
//! {"type":"auth_error", ...} / {"error": ...}  → Inbound::AuthRejected(msg)
//! anything else                                → Inbound::Event(envelope)
//! ```
//!
//! Application events are routed by `type`, falling back to `event`, and
//! finally to [`DEFAULT_EVENT`].

use serde_json::{Map, Value};

use crate::envelope::{AUTH_ERROR, AUTH_SUCCESS, DEFAULT_EVENT};
use crate::{Codec, Envelope, JsonCodec, ProtocolError};

/// Message used when a rejection carries no text of its own.
const DEFAULT_REJECTION: &str = "Authentication failed";

/// What an inbound frame means to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The server accepted our credentials.
    AuthSuccess,
    /// The server rejected our credentials (or reported an error).
    AuthRejected(String),
    /// An application event, keyed by `Envelope::kind`.
    Event(Envelope),
}

impl Inbound {
    /// Parses raw frame text and classifies it.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if the text isn't JSON,
    /// [`ProtocolError::InvalidMessage`] if it isn't a JSON object.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = JsonCodec.decode(text)?;
        Self::classify(value)
    }

    /// Classifies an already-parsed JSON value.
    pub fn classify(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::InvalidMessage(
                "frame is not a JSON object".into(),
            ));
        };

        let kind = string_field(&map, "type");
        if kind == Some(AUTH_SUCCESS) {
            return Ok(Self::AuthSuccess);
        }
        if kind == Some(AUTH_ERROR) || map.get("error").is_some_and(truthy) {
            let message = text_field(&map, "error")
                .or_else(|| text_field(&map, "message"))
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string());
            return Ok(Self::AuthRejected(message));
        }

        let key = kind
            .or_else(|| string_field(&map, "event"))
            .unwrap_or(DEFAULT_EVENT)
            .to_string();

        map.remove("type");
        let data = map.remove("data");
        Ok(Self::Event(Envelope {
            kind: key,
            data,
            extra: map,
        }))
    }
}

/// JSON truthiness: `null`, `false`, `0` and `""` don't count as an error.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn string_field<'a>(map: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    map.get(name).and_then(Value::as_str)
}

/// Like `string_field`, but renders non-string, non-null values too, so an
/// `{"error": {"code": 401}}` still produces a readable message.
fn text_field(map: &Map<String, Value>, name: &str) -> Option<String> {
    match map.get(name)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
