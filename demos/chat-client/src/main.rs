//! Minimal terminal chat client.
//!
//! ```text
//! TETHER_ENDPOINT=ws://127.0.0.1:8000/ws TETHER_TOKEN=dev cargo run -p chat-client
//! ```
//!
//! Lines typed on stdin are sent as `chat` events; incoming `chat` events are
//! printed. Set `RUST_LOG=tether=debug` to watch the connection lifecycle.

use serde::{Deserialize, Serialize};
use tether::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const ENV_TOKEN: &str = "TETHER_TOKEN";

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    text: String,
}

/// Re-reads the token on every attempt, so rotating the variable in a
/// supervisor takes effect on the next reconnect.
struct EnvToken;

impl TokenProvider for EnvToken {
    async fn fetch_token(&self) -> Result<String, SessionError> {
        std::env::var(ENV_TOKEN)
            .map_err(|_| SessionError::TokenUnavailable(format!("{ENV_TOKEN} is not set")))
    }
}

fn hooks() -> LifecycleHooks {
    LifecycleHooks::new()
        .on_auth_success(|| eprintln!("* signed in"))
        .on_auth_error(|msg| eprintln!("* sign-in rejected: {msg}"))
        .on_disconnect(|reason| eprintln!("* disconnected: {reason}"))
        .on_error(|msg| eprintln!("* error: {msg}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig::from_env()?;
    eprintln!("connecting to {}", config.endpoint());

    let client = ConnectionManager::builder(config)
        .hooks(hooks())
        .spawn(EnvToken);

    client.on_data("chat", |msg: ChatMessage| {
        let from = msg.from.as_deref().unwrap_or("?");
        println!("{from}: {}", msg.text);
    });
    client.on(WILDCARD, |env| tracing::debug!(event_type = %env.kind, "received"));

    client.connect().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                let msg = ChatMessage { from: None, text: text.to_string() };
                if !client.emit_json("chat", &msg).await? {
                    eprintln!("* not connected, message dropped");
                }
            }
        }
    }

    client.shutdown().await?;
    Ok(())
}
