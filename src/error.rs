use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in ws-link-manager.
///
/// Construction-time validation fails loudly with [`Error::Config`];
/// everything after construction surfaces as [`Event`](crate::Event)s or
/// as the outcome of
/// [`send_acknowledged`](crate::Connection::send_acknowledged), never as
/// an error out of `send` or `close`.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket protocol or transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection attempt did not complete in time
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
