//! # Tether
//!
//! A persistent, authenticated, auto-reconnecting WebSocket client for
//! real-time messaging.
//!
//! The application supplies an endpoint and a [`TokenProvider`]; Tether
//! handles the rest:
//!
//! - fetching a fresh token before every connection attempt
//! - the `auth` handshake and the server's verdict
//! - reconnecting after unexpected drops (and not after deliberate closes)
//! - routing inbound envelopes to handlers by their `type`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::prelude::*;
//!
//! # async fn run() -> Result<(), TetherError> {
//! let config = ClientConfig::new("wss://api.example.com/ws")?;
//! let client = ConnectionManager::spawn(config, StaticToken::new("dev-token"));
//!
//! client.on("chat", |env| println!("chat: {:?}", env.data));
//! client.connect().await?;
//! client.wait_for_status(|s| s.authenticated).await?;
//! client.emit("chat", Some(json!({ "text": "hello" }))).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate | Role |
//! |---|---|
//! | `tether-transport` | WebSocket sessions and their lifecycle signals |
//! | `tether-protocol` | Envelopes and inbound classification |
//! | `tether-session` | Token provider, handshake, connection state |
//! | `tether-reconnect` | Retry policy and timer |
//! | `tether-dispatch` | Handler registry |

mod actor;
mod client;
mod config;
mod error;
mod hooks;

pub use client::{ConnectionManager, ConnectionManagerBuilder, Status, Subscription};
pub use config::{ClientConfig, ENV_ENDPOINT, ENV_RECONNECT_DELAY_MS};
pub use error::TetherError;
pub use hooks::LifecycleHooks;

pub use tether_dispatch::{Handler, HandlerId, WILDCARD};
pub use tether_protocol::{Envelope, ProtocolError, Value, json};
pub use tether_reconnect::ReconnectConfig;
pub use tether_session::{SessionError, StaticToken, TokenProvider};
pub use tether_transport::{
    CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL, Connector, EventSink, SessionCommand,
    SessionEvent, SessionId, SessionLink, TransportError, WebSocketConnector,
};

/// Everything a typical application needs.
pub mod prelude {
    pub use crate::{
        ClientConfig, ConnectionManager, Envelope, LifecycleHooks, ReconnectConfig,
        SessionError, StaticToken, Status, Subscription, TetherError, TokenProvider, Value,
        WILDCARD, json,
    };
}
