//! Connection lifecycle hooks.
//!
//! Callback-based notifications for the application layer:
//!
//! - [`on_connect`](LifecycleHooks::on_connect): transport opened
//! - [`on_disconnect`](LifecycleHooks::on_disconnect): session ended (with reason)
//! - [`on_error`](LifecycleHooks::on_error): transport or token error
//! - [`on_auth_success`](LifecycleHooks::on_auth_success): handshake accepted
//! - [`on_auth_error`](LifecycleHooks::on_auth_error): handshake rejected
//!
//! Hooks run on the connection task. Keep them short; a panicking hook is
//! caught and logged.
//!
//! ```rust
//! use tether::LifecycleHooks;
//!
//! let hooks = LifecycleHooks::new()
//!     .on_auth_success(|| println!("signed in"))
//!     .on_disconnect(|reason| println!("lost connection: {reason}"));
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

type Notify = Arc<dyn Fn() + Send + Sync>;
type NotifyWith = Arc<dyn Fn(&str) + Send + Sync>;

/// A set of optional lifecycle callbacks.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    on_connect: Option<Notify>,
    on_disconnect: Option<NotifyWith>,
    on_error: Option<NotifyWith>,
    on_auth_success: Option<Notify>,
    on_auth_error: Option<NotifyWith>,
}

impl LifecycleHooks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the transport opens, before the handshake is sent.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called when a session ends, with a human-readable reason.
    pub fn on_disconnect(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Called on transport errors and token fetch failures.
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called once per session when the server accepts the handshake.
    pub fn on_auth_success(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_auth_success = Some(Arc::new(f));
        self
    }

    /// Called when the server rejects the handshake, with its message.
    pub fn on_auth_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_auth_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn connected(&self) {
        if let Some(f) = &self.on_connect {
            guarded("on_connect", || f());
        }
    }

    pub(crate) fn disconnected(&self, reason: &str) {
        if let Some(f) = &self.on_disconnect {
            guarded("on_disconnect", || f(reason));
        }
    }

    pub(crate) fn errored(&self, message: &str) {
        if let Some(f) = &self.on_error {
            guarded("on_error", || f(message));
        }
    }

    pub(crate) fn auth_succeeded(&self) {
        if let Some(f) = &self.on_auth_success {
            guarded("on_auth_success", || f());
        }
    }

    pub(crate) fn auth_failed(&self, message: &str) {
        if let Some(f) = &self.on_auth_error {
            guarded("on_auth_error", || f(message));
        }
    }
}

fn guarded(hook: &'static str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(hook, "lifecycle hook panicked");
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_auth_success", &self.on_auth_success.is_some())
            .field("on_auth_error", &self.on_auth_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_unset_hooks_are_noops() {
        let hooks = LifecycleHooks::new();
        hooks.connected();
        hooks.disconnected("x");
        hooks.errored("x");
        hooks.auth_succeeded();
        hooks.auth_failed("x");
    }

    #[test]
    fn test_hooks_receive_messages() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let (a, b) = (Arc::clone(&log), Arc::clone(&log));
        let hooks = LifecycleHooks::new()
            .on_auth_error(move |m| a.lock().unwrap().push(format!("auth:{m}")))
            .on_disconnect(move |m| b.lock().unwrap().push(format!("down:{m}")));

        hooks.auth_failed("expired");
        hooks.disconnected("code 1006");

        assert_eq!(
            *log.lock().unwrap(),
            vec!["auth:expired".to_string(), "down:code 1006".to_string()]
        );
    }

    #[test]
    fn test_panicking_hook_is_contained() {
        let hooks = LifecycleHooks::new().on_connect(|| panic!("hook bug"));
        hooks.connected();
    }
}
