use http::{HeaderName, HeaderValue};
use std::time::Duration;
use url::Url;

/// Configuration for a [`Connection`](crate::Connection).
///
/// Built through [`ConnectionConfig::builder`], which validates every
/// argument eagerly: a bad address, identity, or secret is rejected
/// before any network activity happens.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    address: Url,
    user_id: String,
    shards: u32,
    password: String,
    retry: RetryConfig,
    transport: TransportOptions,
}

impl ConnectionConfig {
    /// Create a builder from the four required arguments.
    pub fn builder(
        address: impl Into<String>,
        user_id: impl Into<String>,
        shards: u32,
        password: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            address: address.into(),
            user_id: user_id.into(),
            shards,
            password: password.into(),
            retry: RetryConfig::default(),
            transport: TransportOptions::default(),
        }
    }

    /// WebSocket URL of the server.
    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Client identity sent during the handshake.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Shard count sent during the handshake.
    pub fn shards(&self) -> u32 {
        self.shards
    }

    /// Secret sent as the `Authorization` handshake header.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Retry policy parameters.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Transport-level options.
    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    address: String,
    user_id: String,
    shards: u32,
    password: String,
    retry: RetryConfig,
    transport: TransportOptions,
}

impl ConnectionConfigBuilder {
    /// Set the retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set transport-level options.
    pub fn transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending argument.
    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        let address = Url::parse(&self.address)
            .map_err(|e| ConfigError::InvalidAddress(e.to_string()))?;
        if address.scheme() != "ws" && address.scheme() != "wss" {
            return Err(ConfigError::InvalidAddress(format!(
                "scheme must be 'ws' or 'wss', got '{}'",
                address.scheme()
            )));
        }

        if self.user_id.is_empty() || !self.user_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidUserId(
                "user id must be a non-empty string of digits".to_string(),
            ));
        }

        if self.shards < 1 {
            return Err(ConfigError::InvalidShards(
                "shard count must be >= 1".to_string(),
            ));
        }

        if self.password.is_empty() {
            return Err(ConfigError::InvalidPassword(
                "password must not be empty".to_string(),
            ));
        }
        // The password travels as an HTTP header during the handshake.
        if HeaderValue::from_str(&self.password).is_err() {
            return Err(ConfigError::InvalidPassword(
                "password is not a valid header value".to_string(),
            ));
        }

        if self.retry.timeout.is_zero() {
            return Err(ConfigError::InvalidRetry(
                "retry timeout must be > 0".to_string(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 0.0 {
            return Err(ConfigError::InvalidRetry(
                "retry timeout multiplier must be >= 0".to_string(),
            ));
        }

        Ok(ConnectionConfig {
            address,
            user_id: self.user_id,
            shards: self.shards,
            password: self.password,
            retry: self.retry,
            transport: self.transport,
        })
    }
}

/// Maximum number of reconnect attempts after a connection loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Never reconnect automatically. Distinct from `Limit(0)`: a lost
    /// connection closes permanently without a
    /// [`RetriesExhausted`](crate::Event::RetriesExhausted) event.
    Disabled,
    /// Reconnect up to this many times.
    Limit(u32),
}

impl Default for RetryLimit {
    fn default() -> Self {
        RetryLimit::Limit(3)
    }
}

/// Reconnection policy parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retry budget after a connection loss.
    pub limit: RetryLimit,
    /// Base delay before the growth multiplier is applied.
    pub timeout: Duration,
    /// Growth factor per attempt: the delay is multiplied by
    /// `1 + multiplier` before each timer is armed. `0.0` freezes the
    /// delay at its base value.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            limit: RetryLimit::default(),
            timeout: Duration::from_millis(2000),
            multiplier: 2.0,
        }
    }
}

/// Transport-level options applied to every handshake.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Extra headers to include in the handshake request, on top of the
    /// credential headers derived from the connection config.
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            headers: Vec::new(),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The address is not a valid `ws://`/`wss://` URL
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// The user id is not a valid client identity
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    /// The shard count is out of range
    #[error("invalid shard count: {0}")]
    InvalidShards(String),
    /// The password is not usable as a handshake secret
    #[error("invalid password: {0}")]
    InvalidPassword(String),
    /// The retry policy parameters are out of range
    #[error("invalid retry policy: {0}")]
    InvalidRetry(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConnectionConfigBuilder {
        ConnectionConfig::builder("wss://lava.example.com:2333", "123456789", 2, "youshallnotpass")
    }

    #[test]
    fn test_valid_config() {
        let config = base().build().expect("valid config");
        assert_eq!(config.address().scheme(), "wss");
        assert_eq!(config.user_id(), "123456789");
        assert_eq!(config.shards(), 2);
        assert_eq!(config.retry().limit, RetryLimit::Limit(3));
        assert_eq!(config.retry().timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_rejects_non_ws_scheme() {
        let result = ConnectionConfig::builder("https://example.com", "1", 1, "pw").build();
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_rejects_unparseable_address() {
        let result = ConnectionConfig::builder("not a url", "1", 1, "pw").build();
        assert!(matches!(result, Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn test_rejects_bad_user_id() {
        let result = ConnectionConfig::builder("ws://example.com", "", 1, "pw").build();
        assert!(matches!(result, Err(ConfigError::InvalidUserId(_))));

        let result = ConnectionConfig::builder("ws://example.com", "abc123", 1, "pw").build();
        assert!(matches!(result, Err(ConfigError::InvalidUserId(_))));
    }

    #[test]
    fn test_rejects_zero_shards() {
        let result = ConnectionConfig::builder("ws://example.com", "1", 0, "pw").build();
        assert!(matches!(result, Err(ConfigError::InvalidShards(_))));
    }

    #[test]
    fn test_rejects_bad_password() {
        let result = ConnectionConfig::builder("ws://example.com", "1", 1, "").build();
        assert!(matches!(result, Err(ConfigError::InvalidPassword(_))));

        let result = ConnectionConfig::builder("ws://example.com", "1", 1, "line\nbreak").build();
        assert!(matches!(result, Err(ConfigError::InvalidPassword(_))));
    }

    #[test]
    fn test_rejects_bad_retry_policy() {
        let result = base()
            .retry(RetryConfig {
                timeout: Duration::ZERO,
                ..RetryConfig::default()
            })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidRetry(_))));

        let result = base()
            .retry(RetryConfig {
                multiplier: -1.0,
                ..RetryConfig::default()
            })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidRetry(_))));
    }

    #[test]
    fn test_disabled_limit_is_accepted() {
        let config = base()
            .retry(RetryConfig {
                limit: RetryLimit::Disabled,
                ..RetryConfig::default()
            })
            .build()
            .expect("valid config");
        assert_eq!(config.retry().limit, RetryLimit::Disabled);
    }
}
