//! Wire protocol for Tether.
//!
//! - **Envelopes** ([`Envelope`]): the `{type, data?}` records that travel
//!   in both directions.
//! - **Classification** ([`Inbound`]): what an inbound frame means: a
//!   handshake outcome or an application event.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how values become frame
//!   text and back.
//!
//! The protocol layer doesn't know about connections or sessions; it only
//! turns text into meaning.
//!
//! ```text
//! Transport (text frames) → Protocol (Inbound / Envelope) → Client (state, handlers)
//! ```

mod codec;
mod envelope;
mod error;
mod inbound;

pub use codec::{Codec, JsonCodec};
pub use envelope::{AUTH, AUTH_ERROR, AUTH_SUCCESS, DEFAULT_EVENT, Envelope};
pub use error::ProtocolError;
pub use inbound::Inbound;

/// Re-exported so callers can build payloads without a direct dependency.
pub use serde_json::{Value, json};
