//! WebSocket transport implementation using `tokio-tungstenite`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use crate::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, Connector, EventSink, SessionCommand,
    SessionLink, TransportError,
};

/// Close frame arrived without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// How long a locally initiated close waits for the peer's close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// A [`Connector`] that opens WebSocket client connections.
///
/// Each call to [`open`](Connector::open) spawns one Tokio task that owns
/// the socket for the lifetime of the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates a new connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: Url, link: SessionLink) {
        tokio::spawn(run_session(url, link));
    }
}

/// Drives one session from connect to close.
async fn run_session(url: Url, link: SessionLink) {
    let SessionLink { sink, mut commands } = link;
    let session = sink.session();

    // Never log the full URL: it carries the bearer token.
    tracing::debug!(%session, host = ?url.host_str(), path = url.path(), "connecting");

    let mut ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            let err = TransportError::ConnectFailed(e.to_string());
            tracing::warn!(%session, error = %err, "WebSocket connect failed");
            sink.errored(err.to_string());
            sink.closed(CLOSE_ABNORMAL, "connect failed");
            return;
        }
    };

    tracing::debug!(%session, "WebSocket open");
    sink.opened();

    // Set once we've sent our own close frame.
    let mut local_close: Option<(u16, String, Instant)> = None;

    loop {
        let close_deadline = local_close
            .as_ref()
            .map(|(_, _, deadline)| *deadline)
            .unwrap_or_else(|| Instant::now() + CLOSE_HANDSHAKE_TIMEOUT);

        tokio::select! {
            cmd = commands.recv(), if local_close.is_none() => {
                match cmd {
                    Some(SessionCommand::Send(text)) => {
                        if let Err(e) = ws.send(Message::Text(text.into())).await {
                            let err = TransportError::SendFailed(e.to_string());
                            tracing::warn!(%session, error = %err, "send failed");
                            sink.errored(err.to_string());
                            sink.closed(CLOSE_ABNORMAL, "");
                            return;
                        }
                    }
                    Some(SessionCommand::Close { code, reason }) => {
                        begin_close(&mut ws, code, &reason).await;
                        local_close =
                            Some((code, reason, Instant::now() + CLOSE_HANDSHAKE_TIMEOUT));
                    }
                    None => {
                        // Owner dropped the handle without closing.
                        let reason = String::from("session dropped");
                        begin_close(&mut ws, CLOSE_NORMAL, &reason).await;
                        local_close = Some((
                            CLOSE_NORMAL,
                            reason,
                            Instant::now() + CLOSE_HANDSHAKE_TIMEOUT,
                        ));
                    }
                }
            }

            _ = tokio::time::sleep_until(close_deadline), if local_close.is_some() => {
                tracing::debug!(%session, "peer did not answer close frame");
                finish_local(sink, local_close);
                return;
            }

            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        sink.message(text.as_str());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match String::from_utf8(data.to_vec()) {
                            Ok(text) => sink.message(text),
                            Err(_) => {
                                tracing::warn!(
                                    %session,
                                    len = data.len(),
                                    "dropping non-UTF-8 binary frame"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if local_close.is_some() {
                            finish_local(sink, local_close);
                        } else {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                                .unwrap_or((CLOSE_NO_STATUS, String::new()));
                            tracing::debug!(%session, code, %reason, "peer closed");
                            sink.closed(code, reason);
                            // Flush our close reply; the peer may already be gone.
                            let _ = ws.close(None).await;
                        }
                        return;
                    }
                    Some(Ok(_)) => continue, // ping/pong/raw frame
                    Some(Err(e)) => {
                        if local_close.is_some() {
                            finish_local(sink, local_close);
                        } else {
                            let err = TransportError::ReceiveFailed(e.to_string());
                            tracing::warn!(%session, error = %err, "receive failed");
                            sink.errored(err.to_string());
                            sink.closed(CLOSE_ABNORMAL, "");
                        }
                        return;
                    }
                    None => {
                        if local_close.is_some() {
                            finish_local(sink, local_close);
                        } else {
                            sink.closed(CLOSE_ABNORMAL, "");
                        }
                        return;
                    }
                }
            }
        }
    }
}

/// Sends our close frame. Failures are ignored: the read side will notice.
async fn begin_close(ws: &mut WsStream, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_owned().into(),
    };
    if let Err(e) = ws.close(Some(frame)).await {
        tracing::debug!(error = %e, "close frame not sent");
    }
}

/// Reports a locally initiated close with the code we asked for.
fn finish_local(sink: EventSink, local_close: Option<(u16, String, Instant)>) {
    match local_close {
        Some((code, reason, _)) => sink.closed(code, reason),
        None => sink.closed(CLOSE_ABNORMAL, ""),
    }
}
