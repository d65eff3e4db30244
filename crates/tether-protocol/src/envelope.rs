//! The envelope: the unit exchanged over the connection.
//!
//! On the wire an envelope is a JSON object with a required `type`
//! discriminator and an optional `data` payload:
//!
//! ```json
//! { "type": "chat", "data": "hi" }
//! ```
//!
//! Servers are free to add other top-level fields. Those are kept in
//! [`Envelope::extra`] so nothing the server sent is lost on the way to a
//! handler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `type` of the client's authentication envelope.
pub const AUTH: &str = "auth";

/// `type` the server uses to accept the handshake.
pub const AUTH_SUCCESS: &str = "auth_success";

/// `type` the server uses to reject the handshake.
pub const AUTH_ERROR: &str = "auth_error";

/// Routing key for inbound frames that name neither `type` nor `event`.
pub const DEFAULT_EVENT: &str = "message";

/// A typed message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The discriminator (`"type"` on the wire).
    #[serde(rename = "type")]
    pub kind: String,

    /// Optional payload. Omitted from the wire when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Any other top-level fields, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// An envelope with just a type.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
            extra: Map::new(),
        }
    }

    /// An envelope with a type and optional payload.
    pub fn with_data(kind: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            data,
            ..Self::new(kind)
        }
    }

    /// The authentication envelope: `{"type":"auth","token":"..."}`.
    pub fn auth(token: impl Into<String>) -> Self {
        let mut env = Self::new(AUTH);
        env.extra.insert("token".into(), Value::String(token.into()));
        env
    }

    /// Looks up an extra top-level field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
