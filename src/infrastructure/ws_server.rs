//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each incoming connection to a WebSocket session.
//! 3. Registering a [`Session`] (with its own MIDI driver instance) for the
//!    connection's lifetime.
//! 4. Running two halves per connection:
//!    - a reader loop that feeds text frames to the dispatcher and queues
//!      the replies, and
//!    - a writer task that serializes everything on the push channel —
//!      replies and hardware-driven `midimessage`/`midierror*`
//!      notifications alike — onto the WebSocket.
//! 5. Destroying the session (closing its MIDI ports) on disconnect.
//!
//! Each connection runs in its own Tokio task, so one session's resend wait
//! never delays another connection's dispatch.
//!
//! [`Session`]: crate::application::Session

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::dispatcher::handle_inbound;
use crate::application::driver::MidiDriver;
use crate::application::registry::SessionRegistry;
use crate::domain::config::GatewayConfig;
use crate::domain::messages::ServerMessage;

/// Builds one fresh, exclusively-owned MIDI driver per connection.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn MidiDriver + Send> + Send + Sync>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the main WebSocket accept loop until `running` is set to `false`.
///
/// Binds a TCP listener on `config.bind_addr` and hands every accepted
/// connection to a dedicated Tokio task.
///
/// # Errors
///
/// Returns an error only if the TCP listener cannot be bound.
pub async fn run_server(
    config: GatewayConfig,
    drivers: DriverFactory,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!("sysexd listening on {}", config.bind_addr);

    let config = Arc::new(config);
    let registry = Arc::new(SessionRegistry::new());

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout on accept() lets the loop re-check the shutdown
        // flag even when no clients are connecting.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                if config.debug {
                    debug!(%peer_addr, "accepted TCP connection");
                }
                let config = Arc::clone(&config);
                let registry = Arc::clone(&registry);
                let drivers = Arc::clone(&drivers);
                tokio::spawn(async move {
                    handle_connection(stream, config, registry, drivers).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep serving.
                error!(error = %e, "accept error");
            }
            Err(_) => {
                // Timeout — loop back to check the running flag.
            }
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Entry point of each per-connection task: wraps [`run_connection`] and
/// logs the outcome.
async fn handle_connection(
    stream: TcpStream,
    config: Arc<GatewayConfig>,
    registry: Arc<SessionRegistry>,
    drivers: DriverFactory,
) {
    match run_connection(stream, config, registry, drivers).await {
        Ok(id) => info!(%id, "connection closed"),
        Err(e) => warn!("connection closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one client connection.
///
/// 1. Completes the WebSocket handshake.
/// 2. Creates the session and its adapter in the registry.
/// 3. Spawns the writer task draining the push channel to the socket.
/// 4. Reads frames until the client goes away, dispatching each text frame.
/// 5. Removes the session from the registry.
async fn run_connection(
    stream: TcpStream,
    config: Arc<GatewayConfig>,
    registry: Arc<SessionRegistry>,
    drivers: DriverFactory,
) -> anyhow::Result<Uuid> {
    let ws_stream = accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;

    let id = Uuid::new_v4();
    info!(%id, "client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Replies and hardware pushes both travel this channel; the writer task
    // below is the only place that touches the socket's sink half.  The
    // adapter's receive callback holds a sender clone, so a send to a gone
    // connection is simply dropped when the channel closes.
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<ServerMessage>();

    registry.connect(
        id,
        drivers(),
        config.resend.clone(),
        push_tx.clone(),
        config.debug,
    );

    let writer = tokio::spawn(async move {
        while let Some(message) = push_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                        // Client is gone; remaining pushes are dropped.
                        break;
                    }
                }
                Err(e) => error!(error = %e, "outbound message serialization failed"),
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if let Some(reply) = handle_inbound(&registry, &config, id, &text).await {
                    if push_tx.send(reply).is_err() {
                        break;
                    }
                }
            }
            Ok(WsMessage::Binary(_)) => {
                // The protocol is JSON text frames only.
                warn!(%id, "unexpected binary frame (ignored)");
            }
            Ok(WsMessage::Close(_)) => {
                debug!(%id, "close frame received");
                break;
            }
            Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => {}
            Err(WsError::ConnectionClosed | WsError::Protocol(_)) => {
                debug!(%id, "connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(%id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    registry.disconnect(id);
    // The adapter (still holding a push sender inside any in-flight resend
    // wait) keeps the channel open, so the writer is stopped explicitly.
    writer.abort();

    Ok(id)
}
