use crate::config::ConnectionConfig;
use crate::error::Error;
use futures_util::{SinkExt, StreamExt};
use http::header::{HeaderName, AUTHORIZATION};
use http::HeaderValue;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, tungstenite};

/// Lifecycle notifications a transport reports to its owner.
///
/// A transport may emit `Close` without a preceding `Open` (a failed
/// handshake, for example); the manager tolerates both orders.
#[derive(Debug)]
pub enum TransportEvent {
    /// The link is established and writable.
    Open,
    /// The HTTP upgrade completed.
    Upgrade,
    /// The server rejected the handshake with a non-upgrade response.
    UnexpectedResponse {
        /// HTTP status of the response
        status: u16,
    },
    /// A data message arrived.
    Message(Message),
    /// A transport-level error. Always followed by `Close`.
    Error(Error),
    /// The link is gone.
    Close {
        /// Close code, when the peer sent a close frame
        code: Option<u16>,
        /// Close reason, empty when none was given
        reason: String,
    },
}

/// Commands the manager issues to a transport.
#[derive(Debug)]
pub enum TransportCommand {
    /// Write a text payload, optionally acknowledging the write outcome.
    Send {
        payload: String,
        ack: Option<oneshot::Sender<Result<(), Error>>>,
    },
    /// Close the link gracefully.
    Close,
}

/// Handle to one transport instance: a command sender and the event
/// stream it produces. Dropping the link closes the transport.
#[derive(Debug)]
pub struct TransportLink {
    commands: mpsc::UnboundedSender<TransportCommand>,
    pub(crate) events: mpsc::UnboundedReceiver<TransportEvent>,
    close_requested: bool,
}

impl TransportLink {
    /// Pair a command sender with an event receiver.
    pub fn new(
        commands: mpsc::UnboundedSender<TransportCommand>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            commands,
            events,
            close_requested: false,
        }
    }

    /// Hand a payload to the transport. Returns `false` when the
    /// transport is already gone; the payload is dropped either way.
    pub(crate) fn send(
        &self,
        payload: String,
        ack: Option<oneshot::Sender<Result<(), Error>>>,
    ) -> bool {
        self.commands
            .send(TransportCommand::Send { payload, ack })
            .is_ok()
    }

    /// Ask the transport to close. Only the first request is delivered;
    /// repeat calls are no-ops.
    pub(crate) fn request_close(&mut self) {
        if !self.close_requested {
            let _ = self.commands.send(TransportCommand::Close);
            self.close_requested = true;
        }
    }
}

/// Factory for transport instances.
///
/// This is the seam between the connection manager and the socket: the
/// production implementation is [`WsConnector`]; tests substitute a
/// channel-backed mock. `open` must not block; connection failures
/// surface later as [`TransportEvent`]s on the returned link.
pub trait Connector: Send + 'static {
    /// Open a new transport toward the configured address.
    fn open(&mut self, config: &ConnectionConfig) -> TransportLink;
}

/// Production connector backed by tokio-tungstenite.
///
/// Every `open` spawns a driver task that performs the handshake
/// (credential headers included), pumps frames into events and commands
/// into the sink, answers pings, and acknowledges writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&mut self, config: &ConnectionConfig) -> TransportLink {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(config.clone(), event_tx, cmd_rx));
        TransportLink::new(cmd_tx, event_rx)
    }
}

/// Build the handshake request: address plus `Authorization`,
/// `Client-Id`, and `Shard-Count` credential headers, then any extra
/// headers from the transport options.
pub(crate) fn build_request(config: &ConnectionConfig) -> Result<Request, Error> {
    let mut request = config
        .address()
        .as_str()
        .into_client_request()
        .map_err(Error::WebSocket)?;

    let headers = request.headers_mut();
    // Validated at config build time; a failure here means the config
    // was mutated out from under us, so fall back to an empty value
    // rather than panicking.
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(config.password()).unwrap_or(HeaderValue::from_static("")),
    );
    headers.insert(
        HeaderName::from_static("client-id"),
        HeaderValue::from_str(config.user_id()).unwrap_or(HeaderValue::from_static("")),
    );
    headers.insert(
        HeaderName::from_static("shard-count"),
        HeaderValue::from(config.shards()),
    );
    for (name, value) in &config.transport().headers {
        headers.insert(name.clone(), value.clone());
    }

    Ok(request)
}

async fn drive(
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<TransportCommand>,
) {
    let request = match build_request(&config) {
        Ok(request) => request,
        Err(e) => {
            let _ = events.send(TransportEvent::Error(e));
            let _ = events.send(TransportEvent::Close {
                code: None,
                reason: "invalid handshake request".to_string(),
            });
            return;
        }
    };

    let connect_timeout = config.transport().connect_timeout;
    let ws = match timeout(connect_timeout, connect_async(request)).await {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(tungstenite::Error::Http(response))) => {
            let status = response.status().as_u16();
            debug!("handshake rejected with status {}", status);
            let _ = events.send(TransportEvent::UnexpectedResponse { status });
            let _ = events.send(TransportEvent::Close {
                code: None,
                reason: format!("handshake rejected with status {}", status),
            });
            return;
        }
        Ok(Err(e)) => {
            let _ = events.send(TransportEvent::Error(Error::WebSocket(e)));
            let _ = events.send(TransportEvent::Close {
                code: None,
                reason: "connect failed".to_string(),
            });
            return;
        }
        Err(_) => {
            let _ = events.send(TransportEvent::Error(Error::ConnectTimeout(connect_timeout)));
            let _ = events.send(TransportEvent::Close {
                code: None,
                reason: "connect timeout".to_string(),
            });
            return;
        }
    };

    let _ = events.send(TransportEvent::Upgrade);
    let _ = events.send(TransportEvent::Open);

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!("failed to answer ping: {}", e);
                            let _ = events.send(TransportEvent::Error(Error::WebSocket(e)));
                            let _ = events.send(TransportEvent::Close {
                                code: None,
                                reason: "write failed".to_string(),
                            });
                            return;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        let _ = events.send(TransportEvent::Close { code, reason });
                        return;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(message)) => {
                        let _ = events.send(TransportEvent::Message(message));
                    }
                    Some(Err(e)) => {
                        let _ = events.send(TransportEvent::Error(Error::WebSocket(e)));
                        let _ = events.send(TransportEvent::Close {
                            code: None,
                            reason: "stream error".to_string(),
                        });
                        return;
                    }
                    None => {
                        let _ = events.send(TransportEvent::Close {
                            code: None,
                            reason: "stream ended".to_string(),
                        });
                        return;
                    }
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(TransportCommand::Send { payload, ack }) => {
                        let result = write
                            .send(Message::Text(payload))
                            .await
                            .map_err(Error::WebSocket);
                        match (ack, result) {
                            (Some(ack), result) => {
                                let _ = ack.send(result);
                            }
                            (None, Err(e)) => {
                                warn!("send failed: {}", e);
                                let _ = events.send(TransportEvent::Error(e));
                                let _ = events.send(TransportEvent::Close {
                                    code: None,
                                    reason: "write failed".to_string(),
                                });
                                return;
                            }
                            (None, Ok(())) => {}
                        }
                    }
                    Some(TransportCommand::Close) => {
                        trace!("close requested, sending close frame");
                        let _ = write.send(Message::Close(None)).await;
                        // Keep reading so the peer's close frame surfaces
                        // as a Close event through the normal path.
                    }
                    None => {
                        // The manager dropped the link; nobody is
                        // listening for events anymore.
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;

    fn config() -> ConnectionConfig {
        ConnectionConfig::builder("ws://127.0.0.1:2333", "42", 3, "secret")
            .build()
            .expect("valid config")
    }

    #[test]
    fn test_build_request_carries_credentials() {
        let request = build_request(&config()).expect("request");
        let headers = request.headers();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "secret");
        assert_eq!(headers.get("client-id").unwrap(), "42");
        assert_eq!(headers.get("shard-count").unwrap(), "3");
    }

    #[test]
    fn test_build_request_includes_extra_headers() {
        let config = ConnectionConfig::builder("ws://127.0.0.1:2333", "42", 3, "secret")
            .transport(crate::config::TransportOptions {
                headers: vec![(
                    HeaderName::from_static("x-trace"),
                    HeaderValue::from_static("on"),
                )],
                ..Default::default()
            })
            .build()
            .expect("valid config");

        let request = build_request(&config).expect("request");
        assert_eq!(request.headers().get("x-trace").unwrap(), "on");
    }

    #[tokio::test]
    async fn test_failed_connect_surfaces_error_then_close() {
        // Nothing listens on this port; the driver must report the
        // failure as events rather than erroring out of open().
        let config = ConnectionConfig::builder("ws://127.0.0.1:9", "42", 1, "secret")
            .build()
            .expect("valid config");

        let mut link = WsConnector.open(&config);
        let first = link.events.recv().await.expect("error event");
        assert!(matches!(first, TransportEvent::Error(_)));
        let second = link.events.recv().await.expect("close event");
        assert!(matches!(second, TransportEvent::Close { .. }));
    }

    #[test]
    fn test_duplicate_close_requests_collapse() {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let mut link = TransportLink::new(cmd_tx, event_rx);

        link.request_close();
        link.request_close();

        assert!(matches!(cmd_rx.try_recv(), Ok(TransportCommand::Close)));
        assert!(cmd_rx.try_recv().is_err());
    }
}
