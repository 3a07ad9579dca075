use crate::error::Error;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

/// Events observable through [`Connection::subscribe`](crate::Connection::subscribe).
///
/// All variants except [`Event::RetriesExhausted`] are relays of
/// transport-level events; the stream stays valid across transport
/// replacement, so a subscriber registered before a reconnect keeps
/// receiving events from the replacement transport.
#[derive(Debug, Clone)]
pub enum Event {
    /// Transport-level error. Informational; the manager keeps running
    /// toward whatever close the transport eventually produces.
    Error(Arc<Error>),
    /// The HTTP upgrade completed.
    Upgrade,
    /// The server answered the handshake with something other than an
    /// upgrade.
    UnexpectedResponse {
        /// HTTP status of the rejected handshake
        status: u16,
    },
    /// A message arrived from the server.
    Message(Message),
    /// The transport closed.
    Closed {
        /// Close code, when the peer sent a close frame
        code: Option<u16>,
        /// Close reason, empty when none was given
        reason: String,
    },
    /// The retry budget is spent; automatic recovery has stopped. A
    /// manual `close(false)` or a fresh connection is required.
    RetriesExhausted {
        /// Retries consumed before giving up
        retries: u32,
    },
}

/// Bridges one named transport event onto the stable public event stream.
///
/// A relay is bound to a single transport generation and carries a
/// human-readable origin label (source name + event name). The label has
/// no behavioral effect; it exists so diagnostics name where a relayed
/// event came from even after the transport instance is long gone.
#[derive(Debug, Clone)]
pub(crate) struct Relay {
    label: String,
    target: broadcast::Sender<Event>,
}

impl Relay {
    pub fn new(source: &str, event: &str, target: broadcast::Sender<Event>) -> Self {
        Self {
            label: format!("'{}' -> event '{}'", source, event),
            target,
        }
    }

    /// Origin label, e.g. `'websocket#2' -> event 'message'`.
    #[cfg(test)]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Propagate the event verbatim. Having no subscribers is not an
    /// error.
    pub fn forward(&self, event: Event) {
        if self.target.send(event).is_err() {
            trace!("{}: no subscribers, event dropped", self.label);
        }
    }

    /// Propagate the event, then invoke `tap` synchronously.
    ///
    /// The tap runs after emission and is not shielded: a panicking tap
    /// unwinds through the relay and takes the caller down with it.
    pub fn forward_tapped(&self, event: Event, tap_name: &str, tap: impl FnOnce()) {
        self.forward(event);
        trace!("{} => tap '{}'", self.label, tap_name);
        tap();
    }
}

/// One relay per transport event name, bound to a single transport
/// generation. Rebuilt every time a new transport is created so the
/// public stream survives replacement.
#[derive(Debug)]
pub(crate) struct RelaySet {
    pub error: Relay,
    pub upgrade: Relay,
    pub unexpected_response: Relay,
    pub message: Relay,
    pub close: Relay,
}

impl RelaySet {
    pub fn bind(source: &str, target: &broadcast::Sender<Event>) -> Self {
        Self {
            error: Relay::new(source, "error", target.clone()),
            upgrade: Relay::new(source, "upgrade", target.clone()),
            unexpected_response: Relay::new(source, "unexpected-response", target.clone()),
            message: Relay::new(source, "message", target.clone()),
            close: Relay::new(source, "close", target.clone()),
        }
    }
}
