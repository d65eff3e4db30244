//! Reconnection policy for Tether.
//!
//! Decides whether a closed session deserves another attempt, and owns the
//! single retry timer.
//!
//! # Decision rule
//!
//! Close codes 1000 (normal) and 1001 (going away) mean someone hung up on
//! purpose, so nothing is scheduled. Every other code schedules exactly one
//! retry after a fixed delay (3 s by default; constant, not exponential).
//! Scheduling again replaces whatever was pending.
//!
//! # Integration
//!
//! The policy is designed to sit inside the client actor's `tokio::select!`
//! loop. [`ReconnectPolicy::wait_for_fire`] pends forever while nothing is
//! armed, so the branch is inert until a retry is scheduled:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = policy.wait_for_fire() => start_connect().await,
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tether_transport::{CLOSE_GOING_AWAY, CLOSE_NORMAL};
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Turn automatic reconnection off entirely. Default: `true`.
    pub enabled: bool,
    /// Fixed delay between a drop and the retry. Default: 3000 ms.
    pub delay: Duration,
    /// Random extra delay (0..jitter) added to each retry so a fleet of
    /// clients dropped by the same outage doesn't reconnect in lockstep.
    /// Default: zero.
    pub jitter: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Self::DEFAULT_DELAY,
            jitter: Duration::ZERO,
        }
    }
}

impl ReconnectConfig {
    /// The delay used unless configured otherwise.
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(3000);

    /// Delay never exceeds this.
    pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Jitter never exceeds this.
    pub const MAX_JITTER: Duration = Duration::from_secs(60);

    /// Config with a specific delay and default everything else.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Config with reconnection switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`ReconnectPolicy::new`].
    pub fn validated(mut self) -> Self {
        if self.delay > Self::MAX_DELAY {
            warn!(
                delay_ms = self.delay.as_millis() as u64,
                max_ms = Self::MAX_DELAY.as_millis() as u64,
                "reconnect delay exceeds maximum, clamping"
            );
            self.delay = Self::MAX_DELAY;
        }
        if self.jitter > Self::MAX_JITTER {
            warn!(
                jitter_ms = self.jitter.as_millis() as u64,
                max_ms = Self::MAX_JITTER.as_millis() as u64,
                "reconnect jitter exceeds maximum, clamping"
            );
            self.jitter = Self::MAX_JITTER;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Attempt
// ---------------------------------------------------------------------------

/// A scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    /// When the retry was scheduled.
    pub scheduled_at: TokioInstant,
    /// When the retry fires.
    pub fires_at: TokioInstant,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Decides if and when to reconnect. Holds at most one pending attempt.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    pending: Option<ReconnectAttempt>,
    scheduled_total: u64,
    fired_total: u64,
}

impl ReconnectPolicy {
    /// Creates a policy from config.
    pub fn new(config: ReconnectConfig) -> Self {
        let config = config.validated();
        debug!(
            enabled = config.enabled,
            delay_ms = config.delay.as_millis() as u64,
            jitter_ms = config.jitter.as_millis() as u64,
            "reconnect policy created"
        );
        Self {
            config,
            pending: None,
            scheduled_total: 0,
            fired_total: 0,
        }
    }

    /// Returns `true` if a session closed with `code` should be retried.
    pub fn should_reconnect(&self, code: u16) -> bool {
        self.config.enabled && !is_intentional_close(code)
    }

    /// Applies the decision rule to a close: schedules a retry for
    /// unexpected codes and returns it, or returns `None`.
    pub fn on_closed(&mut self, code: u16) -> Option<ReconnectAttempt> {
        if self.should_reconnect(code) {
            Some(self.schedule())
        } else {
            debug!(code, "close was intentional, not reconnecting");
            None
        }
    }

    /// Arms the retry timer, replacing any pending attempt.
    pub fn schedule(&mut self) -> ReconnectAttempt {
        if self.pending.is_some() {
            debug!("replacing pending reconnect");
        }
        let now = TokioInstant::now();
        let jitter = if self.config.jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_us = (self.config.jitter.as_micros() as u64).max(1);
            Duration::from_micros(rand::rng().random_range(0..max_us))
        };
        let delay = self.config.delay + jitter;
        // Far-future deadlines saturate instead of overflowing the clock.
        let fires_at = now
            .checked_add(delay)
            .unwrap_or_else(|| now + ReconnectConfig::MAX_DELAY);
        let attempt = ReconnectAttempt {
            scheduled_at: now,
            fires_at,
        };
        self.pending = Some(attempt);
        self.scheduled_total += 1;
        info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        attempt
    }

    /// Disarms the timer. Returns `true` if something was pending.
    pub fn cancel(&mut self) -> bool {
        let had = self.pending.take().is_some();
        if had {
            debug!("pending reconnect cancelled");
        }
        had
    }

    /// The pending attempt, if any.
    pub fn pending(&self) -> Option<&ReconnectAttempt> {
        self.pending.as_ref()
    }

    /// Returns `true` while a retry is armed.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Total retries scheduled over the policy's lifetime.
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled_total
    }

    /// Total retries that actually fired.
    pub fn fired_count(&self) -> u64 {
        self.fired_total
    }

    /// Waits for the pending retry to come due, disarms it, and returns it.
    ///
    /// With nothing pending this future pends forever, which makes it safe
    /// to leave in a `tokio::select!`. Dropping it before it resolves
    /// leaves the policy untouched.
    pub async fn wait_for_fire(&mut self) -> ReconnectAttempt {
        let Some(attempt) = self.pending else {
            return std::future::pending().await;
        };

        time::sleep_until(attempt.fires_at).await;

        self.pending = None;
        self.fired_total += 1;
        info!("reconnect timer fired");
        attempt
    }
}

/// Close codes that mean "hung up on purpose".
pub fn is_intentional_close(code: u16) -> bool {
    code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY
}
