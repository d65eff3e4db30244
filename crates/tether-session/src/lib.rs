//! Session layer for Tether.
//!
//! This crate covers what it takes to turn a raw transport connection into
//! a trusted one:
//!
//! 1. **Credentials**: asking the identity provider for a fresh bearer
//!    token ([`TokenProvider`])
//! 2. **Handshake**: sending the token and tracking the server's verdict
//!    ([`AuthHandshake`])
//! 3. **State**: the client's connection state machine
//!    ([`ConnectionState`]) and the record of the live [`Session`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Client (above)       ← owns one Session at a time, drives the state machine
//!     ↕
//! Session (this crate) ← credentials, handshake, state
//!     ↕
//! Protocol / Transport ← Envelope, SessionHandle
//! ```

mod auth;
mod error;
mod handshake;
mod session;

pub use auth::{StaticToken, TokenProvider};
pub use error::SessionError;
pub use handshake::{AuthHandshake, HandshakeState};
pub use session::{ConnectionState, Session};
