//! The two handshake flows an operator can run.

pub mod answer;
pub mod offer;

use crate::console::Console;
use crate::error::{Result, SessionError};
use crate::peer::{ConnectionController, Role};
use crate::signaling::{read_record, SignalingExchange};
use std::io;
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::debug;

/// Everything a handshake flow needs.
pub struct Handshake {
    pub controller: Arc<ConnectionController>,
    pub exchange: Arc<SignalingExchange>,
    pub console: Console,
    pub label: String,
    /// Fires when the local description has been printed.
    pub described: oneshot::Receiver<String>,
}

impl Handshake {
    pub async fn run(self) -> Result<()> {
        match self.controller.role() {
            Role::Offerer => offer::run(self).await,
            Role::Answerer => answer::run(self).await,
        }
    }

    /// Waits for the dispatcher to print our description.
    async fn local_description_printed(&mut self) -> Result<String> {
        (&mut self.described).await.map_err(|_| {
            SessionError::illegal("event dispatch stopped before gathering completed")
        })
    }

    /// Reads records from stdin until one is accepted.
    ///
    /// Malformed or oversized records are reported and the operator is asked
    /// again; an empty record aborts the exchange.
    async fn accept_remote(&self, what: &str) -> Result<()> {
        loop {
            self.console.prompt(&format!(
                "Paste the remote {what}, then press Enter on an empty line:"
            ));
            let record = read_stdin_record(self.exchange.max_record_size()).await;
            let result = match record {
                Ok(record) => self.exchange.accept(&self.controller, &record).await,
                Err(e) => Err(e),
            };
            match result {
                Err(e) if e.is_retryable_input() => {
                    self.console.emit_error(&e);
                    self.controller.ensure_usable()?;
                }
                other => return other,
            }
        }
    }
}

/// Reads one record from stdin on its own thread; the read blocks until the
/// operator finishes pasting.
async fn read_stdin_record(max_size: usize) -> Result<String> {
    let (tx, rx) = oneshot::channel();
    thread::Builder::new()
        .name("ssc-signaling".into())
        .spawn(move || {
            let stdin = io::stdin();
            let result = read_record(&mut stdin.lock(), max_size);
            let _ = tx.send(result);
        })?;

    rx.await.unwrap_or_else(|_| {
        debug!("Signaling reader exited without a result");
        Err(SessionError::EmptyDescription)
    })
}
