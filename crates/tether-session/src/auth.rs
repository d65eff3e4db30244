//! Where bearer tokens come from.
//!
//! Tether doesn't mint credentials. That's your identity provider's job
//! (Clerk, Auth0, a refresh-token flow, a secret store...). The client only
//! needs a way to ask for a fresh token, which is what [`TokenProvider`]
//! describes.
//!
//! The client calls `fetch_token` before *every* connection attempt,
//! reconnects included, and never caches the result: a token from five
//! minutes ago may have expired or been revoked since.

use crate::SessionError;

/// Supplies a short-lived bearer token on demand.
///
/// # Example
///
/// ```rust
/// use tether_session::{SessionError, TokenProvider};
///
/// /// Reads the token from an environment variable on every call.
/// struct EnvToken(&'static str);
///
/// impl TokenProvider for EnvToken {
///     async fn fetch_token(&self) -> Result<String, SessionError> {
///         std::env::var(self.0)
///             .map_err(|e| SessionError::TokenUnavailable(e.to_string()))
///     }
/// }
/// ```
pub trait TokenProvider: Send + Sync + 'static {
    /// Returns a token for the next connection attempt.
    ///
    /// # Errors
    /// Any error aborts the current attempt. It is surfaced to the
    /// application as the last error and does not schedule a retry.
    fn fetch_token(
        &self,
    ) -> impl std::future::Future<Output = Result<String, SessionError>> + Send;
}

/// A provider that always hands out the same token.
///
/// Handy for development servers and tests. Production code should fetch
/// from the identity provider so tokens stay fresh.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a fixed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    async fn fetch_token(&self) -> Result<String, SessionError> {
        Ok(self.0.clone())
    }
}
