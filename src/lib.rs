//! # ws-link-manager
//!
//! A resilient client-side WebSocket connection manager with automatic reconnection.
//!
//! ## Features
//!
//! - **Auto-reconnection** with bounded exponential backoff
//! - **Stable event stream** that survives transport replacement
//! - **Lifecycle state machine** observable through a watch channel
//! - **Pluggable transport** via the [`Connector`] trait
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use ws_link_manager::{Connection, ConnectionConfig};
//!
//! let config = ConnectionConfig::builder(
//!     "wss://node.example.com:2333",
//!     "123456789",
//!     2,
//!     "youshallnotpass",
//! )
//! .build()?;
//!
//! let conn = Connection::connect(config);
//! let mut events = conn.subscribe();
//! while let Ok(event) = events.recv().await {
//!     // events keep flowing across reconnects
//! }
//! ```

mod config;
mod connection;
mod error;
mod metrics;
mod policy;
mod relay;
mod transport;

pub use config::{
    ConfigError, ConnectionConfig, ConnectionConfigBuilder, RetryConfig, RetryLimit,
    TransportOptions,
};
pub use connection::{Connection, ConnectionState};
pub use error::Error;
pub use metrics::{Metrics, MetricsSnapshot};
pub use relay::Event;
pub use transport::{Connector, TransportCommand, TransportEvent, TransportLink, WsConnector};

// Re-export http types for TransportOptions headers
pub use http::{HeaderName, HeaderValue};

/// Result type for ws-link-manager operations
pub type Result<T> = std::result::Result<T, Error>;
