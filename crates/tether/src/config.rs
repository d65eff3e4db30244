//! Client configuration.
//!
//! The endpoint is always supplied by the caller, either directly or from
//! the environment. There is no built-in default address.

use std::time::Duration;

use tether_reconnect::ReconnectConfig;
use url::Url;

use crate::TetherError;

/// Environment variable holding the endpoint URL.
pub const ENV_ENDPOINT: &str = "TETHER_ENDPOINT";

/// Environment variable overriding the reconnect delay, in milliseconds.
pub const ENV_RECONNECT_DELAY_MS: &str = "TETHER_RECONNECT_DELAY_MS";

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tether::ClientConfig;
///
/// let config = ClientConfig::new("wss://api.example.com/ws")
///     .unwrap()
///     .reconnect_delay(Duration::from_secs(5));
/// assert_eq!(config.endpoint().as_str(), "wss://api.example.com/ws");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    endpoint: Url,
    token_param: String,
    reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Query parameter that carries the token unless overridden.
    pub const DEFAULT_TOKEN_PARAM: &'static str = "token";

    /// Creates a config for `endpoint`, which must be a `ws://` or
    /// `wss://` URL.
    ///
    /// # Errors
    /// [`TetherError::Config`] if the URL doesn't parse or has another
    /// scheme.
    pub fn new(endpoint: &str) -> Result<Self, TetherError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TetherError::Config(format!("endpoint {endpoint:?}: {e}")))?;
        match endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TetherError::Config(format!(
                    "endpoint scheme must be ws or wss, got {other:?}"
                )));
            }
        }
        Ok(Self {
            endpoint,
            token_param: Self::DEFAULT_TOKEN_PARAM.to_string(),
            reconnect: ReconnectConfig::default(),
        })
    }

    /// Reads the config from `TETHER_ENDPOINT` (required) and
    /// `TETHER_RECONNECT_DELAY_MS` (optional).
    ///
    /// # Errors
    /// [`TetherError::Config`] if the endpoint is missing or invalid, or
    /// the delay isn't a whole number of milliseconds.
    pub fn from_env() -> Result<Self, TetherError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, TetherError> {
        let endpoint = var(ENV_ENDPOINT)
            .ok_or_else(|| TetherError::Config(format!("{ENV_ENDPOINT} is not set")))?;
        let mut config = Self::new(&endpoint)?;
        if let Some(raw) = var(ENV_RECONNECT_DELAY_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                TetherError::Config(format!("{ENV_RECONNECT_DELAY_MS} must be an integer, got {raw:?}"))
            })?;
            config.reconnect.delay = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Uses a different query parameter name for the token.
    pub fn token_param(mut self, name: impl Into<String>) -> Self {
        self.token_param = name.into();
        self
    }

    /// Replaces the reconnection settings.
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Shorthand for changing only the reconnect delay.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect.delay = delay;
        self
    }

    /// The configured endpoint, without credentials.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The reconnection settings.
    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect
    }

    /// The URL for one connection attempt: the endpoint with `token`
    /// set as the token query parameter (replacing any existing value).
    pub fn connect_url(&self, token: &str) -> Url {
        let mut url = self.endpoint.clone();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != self.token_param.as_str())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(&self.token_param, token);
        url
    }
}
