//! Event dispatch for Tether.
//!
//! [`EventDispatcher`] maps event-type keys to the handlers interested in
//! them. Every application envelope the client accepts is handed to
//! [`EventDispatcher::dispatch`], which runs:
//!
//! 1. the handlers registered under `envelope.kind`, then
//! 2. every handler registered under the wildcard key [`WILDCARD`].
//!
//! A handler that panics is caught and logged; the remaining handlers for
//! that envelope still run.
//!
//! Registrations are identified by [`HandlerId`], not by comparing
//! closures. Registering the *same* `Arc` under the same key twice is a
//! no-op that returns the original ID.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tether_protocol::Envelope;

/// Key whose handlers receive every dispatched envelope.
pub const WILDCARD: &str = "*";

/// A subscriber callback.
pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Identifies one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

struct Registration {
    id: HandlerId,
    handler: Handler,
}

/// Registry of handlers keyed by event type.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Vec<Registration>>,
    next_id: u64,
}

impl EventDispatcher {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `event_type` and returns its ID.
    ///
    /// If this exact handler (same `Arc` allocation) is already registered
    /// under `event_type`, nothing changes and the existing ID is returned.
    pub fn subscribe(&mut self, event_type: &str, handler: Handler) -> HandlerId {
        let regs = self.handlers.entry(event_type.to_owned()).or_default();
        if let Some(existing) = regs.iter().find(|r| Arc::ptr_eq(&r.handler, &handler)) {
            return existing.id;
        }
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        regs.push(Registration { id, handler });
        tracing::debug!(event_type, id = id.0, "handler subscribed");
        id
    }

    /// Removes one handler (`Some(id)`) or every handler (`None`) for
    /// `event_type`. Returns how many registrations were removed.
    pub fn unsubscribe(&mut self, event_type: &str, id: Option<HandlerId>) -> usize {
        let removed = match id {
            None => self.handlers.remove(event_type).map_or(0, |regs| regs.len()),
            Some(id) => {
                let Some(regs) = self.handlers.get_mut(event_type) else {
                    return 0;
                };
                let before = regs.len();
                regs.retain(|r| r.id != id);
                let removed = before - regs.len();
                if regs.is_empty() {
                    self.handlers.remove(event_type);
                }
                removed
            }
        };
        if removed > 0 {
            tracing::debug!(event_type, removed, "handlers unsubscribed");
        }
        removed
    }

    /// Drops every registration.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Number of handlers registered under `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The handlers `envelope` should reach: type-specific first, then
    /// wildcard. A handler registered under both appears once.
    ///
    /// Collecting first lets callers release any lock around the registry
    /// before running user code.
    pub fn handlers_for(&self, envelope: &Envelope) -> Vec<Handler> {
        let mut out: Vec<Handler> = Vec::new();
        let specific = self.handlers.get(envelope.kind.as_str());
        let wildcard = if envelope.kind == WILDCARD {
            None
        } else {
            self.handlers.get(WILDCARD)
        };
        for reg in specific.into_iter().chain(wildcard).flatten() {
            if !out.iter().any(|h| Arc::ptr_eq(h, &reg.handler)) {
                out.push(Arc::clone(&reg.handler));
            }
        }
        out
    }

    /// Delivers `envelope` to every matching handler. Returns how many
    /// handlers ran to completion.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        invoke_all(&self.handlers_for(envelope), envelope)
    }
}

/// Runs each handler with `envelope`, isolating panics. Returns how many
/// handlers completed.
pub fn invoke_all(handlers: &[Handler], envelope: &Envelope) -> usize {
    let mut completed = 0;
    for handler in handlers {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(envelope))) {
            Ok(()) => completed += 1,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                tracing::error!(
                    event_type = %envelope.kind,
                    %reason,
                    "event handler panicked"
                );
            }
        }
    }
    completed
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("EventDispatcher")
            .field("handlers", &counts)
            .finish()
    }
}
