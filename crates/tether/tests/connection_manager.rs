//! Connection manager behaviour against a scripted transport.
//!
//! The mock connector hands every opened session to the test, which then
//! plays the server: it reports `opened`, pushes frames, reads what the
//! client sent, and closes with whatever code the scenario needs. Time is
//! paused, so reconnect delays elapse instantly and exactly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tether::prelude::*;
use tether::{Connector, EventSink, SessionCommand, SessionLink};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use url::Url;

const PATIENCE: Duration = Duration::from_secs(60);
const QUIET: Duration = Duration::from_secs(10);

// =========================================================================
// Mock transport
// =========================================================================

struct MockConnector {
    opened: mpsc::UnboundedSender<(Url, SessionLink)>,
}

impl Connector for MockConnector {
    fn open(&self, url: Url, link: SessionLink) {
        let _ = self.opened.send((url, link));
    }
}

/// The server side of the mock: every session the client opens lands here.
struct MockServer {
    sessions: mpsc::UnboundedReceiver<(Url, SessionLink)>,
}

impl MockServer {
    async fn accept(&mut self) -> MockSession {
        let (url, link) = timeout(PATIENCE, self.sessions.recv())
            .await
            .expect("client never opened a session")
            .expect("client task is gone");
        MockSession {
            url,
            sink: Some(link.sink),
            commands: link.commands,
        }
    }

    async fn assert_no_session(&mut self) {
        assert!(
            timeout(QUIET, self.sessions.recv()).await.is_err(),
            "client opened an unexpected session"
        );
    }
}

struct MockSession {
    url: Url,
    sink: Option<EventSink>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl MockSession {
    fn token(&self) -> String {
        self.url
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .expect("no token in connect URL")
    }

    fn sink(&self) -> &EventSink {
        self.sink.as_ref().expect("session already closed")
    }

    fn open(&self) {
        self.sink().opened();
    }

    fn push(&self, frame: Value) {
        self.sink().message(frame.to_string());
    }

    fn push_raw(&self, text: &str) {
        self.sink().message(text);
    }

    fn error(&self, message: &str) {
        self.sink().errored(message);
    }

    fn close(&mut self, code: u16, reason: &str) {
        self.sink
            .take()
            .expect("session already closed")
            .closed(code, reason);
    }

    async fn next_command(&mut self) -> Option<SessionCommand> {
        timeout(PATIENCE, self.commands.recv())
            .await
            .expect("client sent nothing")
    }

    async fn next_frame(&mut self) -> Value {
        match self.next_command().await {
            Some(SessionCommand::Send(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a frame, got {other:?}"),
        }
    }
}

// =========================================================================
// Token providers and hook recorder
// =========================================================================

#[derive(Clone, Default)]
struct CountingToken(Arc<AtomicUsize>);

impl CountingToken {
    fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl TokenProvider for CountingToken {
    async fn fetch_token(&self) -> Result<String, SessionError> {
        let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("tok-{n}"))
    }
}

struct SignedOut;

impl TokenProvider for SignedOut {
    async fn fetch_token(&self) -> Result<String, SessionError> {
        Err(SessionError::TokenUnavailable("signed out".into()))
    }
}

/// Never answers.
struct Stalled;

impl TokenProvider for Stalled {
    async fn fetch_token(&self) -> Result<String, SessionError> {
        std::future::pending().await
    }
}

struct Panicking;

impl TokenProvider for Panicking {
    async fn fetch_token(&self) -> Result<String, SessionError> {
        panic!("keychain locked")
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn hooks(&self) -> LifecycleHooks {
        let (a, b, c, d, e) = (
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        );
        LifecycleHooks::new()
            .on_connect(move || a.push("connect".into()))
            .on_disconnect(move |r| b.push(format!("disconnect:{r}")))
            .on_error(move |m| c.push(format!("error:{m}")))
            .on_auth_success(move || d.push("auth_success".into()))
            .on_auth_error(move |m| e.push(format!("auth_error:{m}")))
    }

    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn setup<P: TokenProvider>(provider: P) -> (ConnectionManager, MockServer, Recorder) {
    let (tx, rx) = mpsc::unbounded_channel();
    let recorder = Recorder::default();
    let config = ClientConfig::new("ws://chat.test/ws").unwrap();
    let client = ConnectionManager::spawn_with_connector(
        config,
        provider,
        MockConnector { opened: tx },
        recorder.hooks(),
    );
    (client, MockServer { sessions: rx }, recorder)
}

async fn until(client: &ConnectionManager, predicate: impl FnMut(&Status) -> bool) -> Status {
    timeout(PATIENCE, client.wait_for_status(predicate))
        .await
        .expect("status never reached")
        .unwrap()
}

/// Connects and walks the handshake to completion. The auth frame has been
/// consumed when this returns.
async fn authenticated(client: &ConnectionManager, server: &mut MockServer) -> MockSession {
    client.connect().await.unwrap();
    let mut session = server.accept().await;
    session.open();
    assert_eq!(session.next_frame().await["type"], "auth");
    session.push(json!({ "type": "auth_success" }));
    until(client, |s| s.authenticated).await;
    session
}

fn collect(
    client: &ConnectionManager,
    event: &str,
) -> (Subscription, mpsc::UnboundedReceiver<Envelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = client.on(event, move |env: &Envelope| {
        let _ = tx.send(env.clone());
    });
    (sub, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    timeout(PATIENCE, rx.recv())
        .await
        .expect("handler never ran")
        .expect("handler was dropped")
}

// =========================================================================
// Connect
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_repeated_connect_opens_one_session() {
    let provider = CountingToken::default();
    let (client, mut server, _) = setup(provider.clone());

    client.connect().await.unwrap();
    client.connect().await.unwrap();
    client.connect().await.unwrap();

    let session = server.accept().await;
    assert_eq!(session.token(), "tok-1");
    assert_eq!(session.url.path(), "/ws");
    server.assert_no_session().await;
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auth_envelope_is_the_first_frame() {
    let (client, mut server, recorder) = setup(CountingToken::default());

    client.connect().await.unwrap();
    let mut session = server.accept().await;
    session.open();
    let status = until(&client, |s| s.connected).await;
    assert!(!status.authenticated);
    assert_eq!(recorder.entries(), vec!["connect"]);

    // Sending is allowed while the handshake is in flight.
    assert!(client.emit("chat", Some(json!("early"))).await);

    assert_eq!(
        session.next_frame().await,
        json!({ "type": "auth", "token": "tok-1" })
    );
    assert_eq!(
        session.next_frame().await,
        json!({ "type": "chat", "data": "early" })
    );
}

#[tokio::test(start_paused = true)]
async fn test_auth_success_fires_once() {
    let (client, mut server, recorder) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    let (_sub, mut chats) = collect(&client, "chat");

    session.push(json!({ "type": "auth_success" }));
    session.push(json!({ "type": "chat", "data": 1 }));
    recv(&mut chats).await;

    assert_eq!(recorder.count("auth_success"), 1);
    assert!(client.is_authenticated());
    assert!(client.is_connected());
}

// =========================================================================
// Auth rejection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_auth_error_closes_normally_without_retry() {
    let provider = CountingToken::default();
    let (client, mut server, recorder) = setup(provider.clone());

    client.connect().await.unwrap();
    let mut session = server.accept().await;
    session.open();
    session.next_frame().await;
    session.push(json!({ "type": "auth_error", "message": "token expired" }));

    assert_eq!(
        session.next_command().await,
        Some(SessionCommand::Close {
            code: 1000,
            reason: "Authentication failed".into()
        })
    );
    let status = until(&client, |s| s.last_error.is_some()).await;
    assert_eq!(status.last_error.as_deref(), Some("token expired"));
    assert!(!status.authenticated);
    assert!(!status.connected);
    assert_eq!(recorder.count("auth_error:token expired"), 1);

    session.close(1000, "Authentication failed");
    server.assert_no_session().await;
    assert!(!client.status().reconnect_pending);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_field_rejects_and_abnormal_close_still_does_not_retry() {
    let (client, mut server, recorder) = setup(CountingToken::default());

    client.connect().await.unwrap();
    let mut session = server.accept().await;
    session.open();
    session.next_frame().await;
    session.push(json!({ "error": "invalid token" }));
    until(&client, |s| s.last_error.is_some()).await;

    // The server drops us instead of completing the close handshake.
    session.close(1006, "");
    until(&client, |s| !s.connected).await;
    server.assert_no_session().await;
    assert_eq!(recorder.count("auth_error:invalid token"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_auth_error_starts_a_fresh_attempt() {
    let provider = CountingToken::default();
    let (client, mut server, _) = setup(provider.clone());

    client.connect().await.unwrap();
    let mut first = server.accept().await;
    first.open();
    first.next_frame().await;
    first.push(json!({ "type": "auth_error", "message": "token expired" }));
    assert!(matches!(
        first.next_command().await,
        Some(SessionCommand::Close { code: 1000, .. })
    ));

    // The rejected session hasn't confirmed its close yet.
    client.connect().await.unwrap();
    let mut second = server.accept().await;
    assert_eq!(second.token(), "tok-2");
    assert_eq!(provider.calls(), 2);

    // Its late close must not disturb the new session.
    first.close(1000, "Authentication failed");
    second.open();
    assert_eq!(
        second.next_frame().await,
        json!({ "type": "auth", "token": "tok-2" })
    );
    second.push(json!({ "type": "auth_success" }));
    let status = until(&client, |s| s.authenticated).await;
    assert!(status.connected);
    assert_eq!(status.last_error, None);
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_retries_once_with_a_fresh_token() {
    let provider = CountingToken::default();
    let (client, mut server, recorder) = setup(provider.clone());
    let mut first = authenticated(&client, &mut server).await;

    let dropped_at = Instant::now();
    first.close(1006, "");

    let status = until(&client, |s| s.reconnect_pending).await;
    assert!(!status.connected);
    assert!(!status.authenticated);
    assert_eq!(recorder.count("disconnect:Connection closed with code 1006"), 1);

    let second = server.accept().await;
    assert!(dropped_at.elapsed() >= Duration::from_millis(3000));
    assert_eq!(second.token(), "tok-2");
    assert_eq!(provider.calls(), 2);

    server.assert_no_session().await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_intentional_close_codes_do_not_retry() {
    for code in [1000, 1001] {
        let provider = CountingToken::default();
        let (client, mut server, recorder) = setup(provider.clone());
        let mut session = authenticated(&client, &mut server).await;

        session.close(code, "bye");
        until(&client, |s| !s.connected).await;

        assert!(!client.status().reconnect_pending, "code {code}");
        assert_eq!(recorder.count("disconnect:bye"), 1);
        server.assert_no_session().await;
        assert_eq!(provider.calls(), 1, "code {code}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_reconnect() {
    let provider = CountingToken::default();
    let (client, mut server, _) = setup(provider.clone());
    let mut session = authenticated(&client, &mut server).await;

    session.close(4000, "server restart");
    until(&client, |s| s.reconnect_pending).await;

    client.close().await.unwrap();
    assert!(!client.status().reconnect_pending);
    server.assert_no_session().await;
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_supersedes_pending_reconnect() {
    let provider = CountingToken::default();
    let (client, mut server, _) = setup(provider.clone());
    let mut first = authenticated(&client, &mut server).await;

    first.close(1006, "");
    until(&client, |s| s.reconnect_pending).await;
    client.connect().await.unwrap();

    let second = server.accept().await;
    assert_eq!(second.token(), "tok-2");
    assert!(!client.status().reconnect_pending);
    server.assert_no_session().await;
}

#[tokio::test(start_paused = true)]
async fn test_huge_reconnect_delay_keeps_the_client_running() {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = ClientConfig::new("ws://chat.test/ws")
        .unwrap()
        .reconnect_delay(Duration::MAX);
    let client = ConnectionManager::spawn_with_connector(
        config,
        CountingToken::default(),
        MockConnector { opened: tx },
        LifecycleHooks::new(),
    );
    let mut server = MockServer { sessions: rx };
    let mut session = authenticated(&client, &mut server).await;

    session.close(1006, "");
    until(&client, |s| s.reconnect_pending).await;

    client.connect().await.unwrap();
    assert_eq!(server.accept().await.token(), "tok-2");
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_clears_connected_until_close() {
    let (client, mut server, recorder) = setup(CountingToken::default());
    let mut first = authenticated(&client, &mut server).await;

    first.error("connection reset");
    let status = until(&client, |s| !s.connected).await;
    assert_eq!(status.last_error.as_deref(), Some("connection reset"));
    assert_eq!(recorder.count("error:connection reset"), 1);
    assert!(!client.emit("chat", None).await);

    first.close(1006, "");
    let second = server.accept().await;
    second.open();

    // A successful open clears the previous error.
    let status = until(&client, |s| s.connected).await;
    assert_eq!(status.last_error, None);
}

// =========================================================================
// Close
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_close_twice_is_a_noop() {
    let (client, mut server, recorder) = setup(CountingToken::default());
    let mut session = authenticated(&client, &mut server).await;

    client.close().await.unwrap();
    client.close().await.unwrap();

    assert_eq!(
        session.next_command().await,
        Some(SessionCommand::Close {
            code: 1000,
            reason: "Manual close".into()
        })
    );
    // The manager released the session after the first close.
    assert_eq!(session.next_command().await, None);
    assert_eq!(recorder.count("disconnect:Manual close"), 1);
    assert_eq!(client.status(), Status::default());

    // The transport's confirmation arrives after the fact and changes nothing.
    session.close(1000, "Manual close");
    server.assert_no_session().await;
    assert_eq!(recorder.count("disconnect:Manual close"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_clears_handlers() {
    let (client, mut server, _) = setup(CountingToken::default());
    let _first = authenticated(&client, &mut server).await;
    let (sub, mut old) = collect(&client, "chat");

    client.close().await.unwrap();

    // The registry dropped the handler, and with it the sender.
    assert!(old.recv().await.is_none());
    assert!(!sub.cancel());

    let second = authenticated(&client, &mut server).await;
    let (_sub, mut fresh) = collect(&client, "chat");
    second.push(json!({ "type": "chat", "data": "after" }));
    assert_eq!(recv(&mut fresh).await.data, Some(json!("after")));
}

#[tokio::test(start_paused = true)]
async fn test_close_during_token_fetch_abandons_attempt() {
    let (client, mut server, _) = setup(Stalled);

    client.connect().await.unwrap();
    client.close().await.unwrap();

    server.assert_no_session().await;
    assert_eq!(client.status(), Status::default());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_client() {
    let (client, mut server, _) = setup(CountingToken::default());
    let mut session = authenticated(&client, &mut server).await;

    client.shutdown().await.unwrap();

    assert_eq!(
        session.next_command().await,
        Some(SessionCommand::Close {
            code: 1001,
            reason: "Client shut down".into()
        })
    );
    assert!(matches!(client.connect().await, Err(TetherError::Shutdown)));
    assert!(!client.emit("chat", None).await);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_closes_the_session() {
    let (client, mut server, _) = setup(CountingToken::default());
    let mut session = authenticated(&client, &mut server).await;

    let other = client.clone();
    drop(client);
    assert!(other.is_authenticated());
    drop(other);

    assert_eq!(
        session.next_command().await,
        Some(SessionCommand::Close {
            code: 1001,
            reason: "Client dropped".into()
        })
    );
}

// =========================================================================
// Sending
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_emit_while_disconnected_is_dropped() {
    let (client, mut server, _) = setup(CountingToken::default());

    assert!(!client.emit("chat", Some(json!("lost"))).await);
    assert!(!client.send(Envelope::new("chat")).await);

    client.connect().await.unwrap();
    let mut session = server.accept().await;
    // Session exists but the transport hasn't opened yet.
    assert!(!client.emit("chat", None).await);

    session.open();
    assert_eq!(session.next_frame().await["type"], "auth");
    assert!(client.emit("chat", None).await);
    assert_eq!(session.next_frame().await, json!({ "type": "chat" }));
}

#[tokio::test(start_paused = true)]
async fn test_emit_json_serializes_payload() {
    #[derive(serde::Serialize)]
    struct Typing {
        room: u32,
    }

    let (client, mut server, _) = setup(CountingToken::default());
    let mut session = authenticated(&client, &mut server).await;

    assert!(client.emit_json("typing", &Typing { room: 7 }).await.unwrap());
    assert_eq!(
        session.next_frame().await,
        json!({ "type": "typing", "data": { "room": 7 } })
    );
}

// =========================================================================
// Dispatch
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_events_route_by_type_and_wildcard() {
    let (client, mut server, _) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    let (_ping_sub, mut pings) = collect(&client, "ping");
    let (_all_sub, mut all) = collect(&client, WILDCARD);

    session.push(json!({ "type": "ping" }));
    session.push(json!({ "type": "pong" }));

    assert_eq!(recv(&mut pings).await.kind, "ping");
    assert_eq!(recv(&mut all).await.kind, "ping");
    assert_eq!(recv(&mut all).await.kind, "pong");
    assert!(pings.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_event_key_falls_back_to_event_then_message() {
    let (client, mut server, _) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    let (_t, mut typing) = collect(&client, "typing");
    let (_m, mut message) = collect(&client, "message");

    session.push(json!({ "event": "typing", "data": 1 }));
    session.push(json!({ "data": 2 }));

    assert_eq!(recv(&mut typing).await.data, Some(json!(1)));
    assert_eq!(recv(&mut message).await.data, Some(json!(2)));
}

#[tokio::test(start_paused = true)]
async fn test_events_before_auth_are_discarded() {
    let (client, mut server, _) = setup(CountingToken::default());
    let (_sub, mut chats) = collect(&client, "chat");

    client.connect().await.unwrap();
    let mut session = server.accept().await;
    session.open();
    session.next_frame().await;

    session.push(json!({ "type": "chat", "data": "early" }));
    session.push(json!({ "type": "auth_success" }));
    session.push(json!({ "type": "chat", "data": "late" }));

    assert_eq!(recv(&mut chats).await.data, Some(json!("late")));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frames_are_dropped() {
    let (client, mut server, _) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    let (_sub, mut chats) = collect(&client, "chat");

    session.push_raw("not json at all");
    session.push_raw("[1, 2, 3]");
    session.push(json!({ "type": "chat", "data": "still here" }));

    assert_eq!(recv(&mut chats).await.data, Some(json!("still here")));
    assert!(client.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_handler_does_not_stop_dispatch() {
    let (client, mut server, _) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    client.on("chat", |_| panic!("handler bug"));
    let (_sub, mut chats) = collect(&client, "chat");

    session.push(json!({ "type": "chat", "data": 1 }));
    session.push(json!({ "type": "chat", "data": 2 }));

    assert_eq!(recv(&mut chats).await.data, Some(json!(1)));
    assert_eq!(recv(&mut chats).await.data, Some(json!(2)));
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_subscription_stops_receiving() {
    let (client, mut server, _) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    let (sub, mut cancelled) = collect(&client, "chat");
    let (_keep, mut kept) = collect(&client, "chat");

    assert!(sub.cancel());
    session.push(json!({ "type": "chat", "data": "x" }));

    recv(&mut kept).await;
    assert!(cancelled.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_all_for_event() {
    let (client, mut server, _) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    let (_a, mut a) = collect(&client, "chat");
    let (_b, mut b) = collect(&client, "chat");
    let (_all, mut all) = collect(&client, WILDCARD);

    assert_eq!(client.unsubscribe("chat", None), 2);
    session.push(json!({ "type": "chat" }));

    recv(&mut all).await;
    assert!(a.recv().await.is_none());
    assert!(b.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_on_data_decodes_payload() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Chat {
        text: String,
    }

    let (client, mut server, _) = setup(CountingToken::default());
    let session = authenticated(&client, &mut server).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_data("chat", move |chat: Chat| {
        let _ = tx.send(chat);
    });

    session.push(json!({ "type": "chat", "data": 42 }));
    session.push(json!({ "type": "chat", "data": { "text": "hi" } }));

    let chat = timeout(PATIENCE, rx.recv()).await.unwrap().unwrap();
    assert_eq!(chat, Chat { text: "hi".into() });
}

// =========================================================================
// Stale signals and token failures
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_signals_from_a_replaced_session_are_ignored() {
    let (client, mut server, _) = setup(CountingToken::default());

    client.connect().await.unwrap();
    let mut old = server.accept().await;
    old.open();
    until(&client, |s| s.connected).await;

    client.close().await.unwrap();
    client.connect().await.unwrap();
    let new = server.accept().await;

    old.push(json!({ "type": "auth_success" }));
    new.open();
    until(&client, |s| s.connected).await;
    assert!(!client.is_authenticated());

    old.close(1006, "");
    new.push(json!({ "type": "auth_success" }));
    let status = until(&client, |s| s.authenticated).await;
    assert!(!status.reconnect_pending);
    server.assert_no_session().await;
}

#[tokio::test(start_paused = true)]
async fn test_token_failure_aborts_without_retry() {
    let (client, mut server, recorder) = setup(SignedOut);

    client.connect().await.unwrap();
    let status = until(&client, |s| s.last_error.is_some()).await;

    assert_eq!(status.last_error.as_deref(), Some("token unavailable: signed out"));
    assert!(!status.connected);
    assert!(!status.reconnect_pending);
    assert_eq!(recorder.entries(), vec!["error:token unavailable: signed out"]);
    server.assert_no_session().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_token_provider_reports_an_error() {
    const MESSAGE: &str = "token unavailable: token provider panicked";
    let (client, mut server, recorder) = setup(Panicking);

    client.connect().await.unwrap();
    let status = until(&client, |s| s.last_error.is_some()).await;
    assert_eq!(status.last_error.as_deref(), Some(MESSAGE));
    assert!(!status.connected);
    assert!(!status.reconnect_pending);
    server.assert_no_session().await;

    // Back to idle, so the next connect makes another attempt.
    client.connect().await.unwrap();
    let error = format!("error:{MESSAGE}");
    timeout(PATIENCE, async {
        while recorder.count(&error) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("second attempt never reported");
}
