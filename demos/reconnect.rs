//! Connects to a local WebSocket server and logs every lifecycle event,
//! including the reconnect cycles when the server goes away.
//!
//! Point it at any server listening on 127.0.0.1:2333, then kill and
//! restart the server to watch the backoff in action:
//!
//! ```sh
//! RUST_LOG=debug cargo run --example reconnect
//! ```

use tracing::info;
use ws_link_manager::{Connection, ConnectionConfig, Event};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let config = ConnectionConfig::builder(
        "ws://127.0.0.1:2333",
        "123456789",
        1,
        "youshallnotpass",
    )
    .build()?;

    let conn = Connection::connect(config);

    // Log state transitions alongside the event stream.
    let mut state = conn.watch_state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            info!("state: {:?}", *state.borrow());
        }
    });

    let mut events = conn.subscribe();
    while let Ok(event) = events.recv().await {
        match event {
            Event::Message(message) => info!("message: {:?}", message),
            Event::RetriesExhausted { retries } => {
                info!("gave up after {} retries", retries);
                break;
            }
            other => info!("event: {:?}", other),
        }
    }

    info!("final metrics: {:?}", conn.metrics().snapshot());
    conn.close(true);
    Ok(())
}
