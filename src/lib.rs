pub mod commands;
pub mod config;
pub mod console;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod message_loop;
pub mod peer;
pub mod signaling;
mod utils;

use crate::commands::Handshake;
use crate::config::Config;
use crate::console::Console;
use crate::dispatcher::{Dispatcher, ShutdownReason};
use crate::peer::state::DRAIN_TIMEOUT;
use crate::peer::{event_channel, ConnectionController};
use crate::signaling::SignalingExchange;
use std::io::{self, BufReader};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Runs one chat session until the connection ends, the channel closes or
/// the operator interrupts it.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let console = Console::stdout();
    let (events_tx, events_rx) = event_channel();
    let controller =
        Arc::new(ConnectionController::create(&config.connection, config.role, events_tx).await?);
    info!(
        "Starting as {} for session {}",
        config.role,
        controller.session_id()
    );

    let exchange = Arc::new(SignalingExchange::new(
        console.clone(),
        config.format,
        config.max_description_size,
    ));
    let (described_tx, described_rx) = oneshot::channel();

    let dispatcher = Dispatcher::new(
        controller.clone(),
        exchange.clone(),
        console.clone(),
        described_tx,
        BufReader::new(io::stdin()),
    )
    .with_ping_interval(config.ping_interval);
    let stop_dispatch = dispatcher.stop_handle();
    let mut dispatch = tokio::spawn(dispatcher.run(events_rx));

    let handshake = Handshake {
        controller: controller.clone(),
        exchange,
        console: console.clone(),
        label: config.label,
        described: described_rx,
    };
    let mut handshake = tokio::spawn(handshake.run());
    let mut handshake_done = false;
    let mut dispatch_done = false;

    let reason = loop {
        tokio::select! {
            result = &mut dispatch => {
                dispatch_done = true;
                break result.unwrap_or_else(|e| {
                    warn!("Event dispatcher stopped: {e}");
                    ShutdownReason::ConnectionClosed
                });
            }
            result = &mut handshake, if !handshake_done => {
                handshake_done = true;
                match result {
                    Ok(Ok(())) => debug!("Handshake finished, waiting for the channel"),
                    Ok(Err(e)) => {
                        console.emit_error(&e);
                        break ShutdownReason::HandshakeAborted;
                    }
                    Err(e) => {
                        warn!("Handshake task stopped: {e}");
                        break ShutdownReason::HandshakeAborted;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break ShutdownReason::Interrupted,
        }
    };

    info!("Shutting down: {reason}");
    if !handshake_done {
        handshake.abort();
    }
    if !dispatch_done {
        // lets the dispatcher stop its message loop before the channel closes
        stop_dispatch.notify_one();
        if timeout(DRAIN_TIMEOUT, &mut dispatch).await.is_err() {
            warn!("Event dispatcher did not stop in time");
            dispatch.abort();
        }
    }
    if let Err(e) = controller.shutdown(DRAIN_TIMEOUT).await {
        debug!("Shutdown reported: {e}");
    }
    console.line(format!("[Session ended: {reason}]"));

    match reason {
        ShutdownReason::ConnectionFailed | ShutdownReason::HandshakeAborted => {
            anyhow::bail!("session ended: {reason}")
        }
        _ => Ok(()),
    }
}
