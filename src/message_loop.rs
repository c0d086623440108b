//! Operator-driven sending.
//!
//! A dedicated thread blocks on the input and forwards lines over a channel
//! to an async task that owns the sends, so the blocking read never stalls
//! event dispatch.

use crate::console::Console;
use crate::error::SessionError;
use crate::peer::state::PING_LEN;
use crate::peer::{ChannelState, DataChannelSession};
use crate::utils::random_alpha;
use std::io::BufRead;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lines typed ahead of the sender.
const INPUT_BACKLOG: usize = 64;

pub struct MessageLoop {
    sender: JoinHandle<usize>,
    pinger: Option<JoinHandle<()>>,
}

impl MessageLoop {
    /// Starts reading `input` and sending each non-blank line on `session`.
    ///
    /// Only call once the channel is open; sends on a closed channel fail
    /// fast and end the loop.
    pub fn start<R>(session: DataChannelSession, console: Console, input: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<String>(INPUT_BACKLOG);

        // Not joined: a pending read is abandoned at shutdown.
        let spawned = thread::Builder::new()
            .name("ssc-input".into())
            .spawn(move || read_lines(input, tx));
        if let Err(e) = spawned {
            warn!("Could not start the input reader: {e}");
        }

        info!("Message loop started on '{}'", session.label());
        let sender = tokio::spawn(send_lines(session, console, rx));
        Self {
            sender,
            pinger: None,
        }
    }

    /// Also sends a random string every `interval` until a send fails.
    pub fn with_pings(mut self, session: DataChannelSession, console: Console, interval: Duration) -> Self {
        self.pinger = Some(tokio::spawn(ping(session, console, interval)));
        self
    }

    /// Number of lines sent once the input ends or the channel closes.
    pub async fn join(self) -> usize {
        if let Some(pinger) = &self.pinger {
            pinger.abort();
        }
        self.sender.await.unwrap_or(0)
    }

    pub fn abort(&self) {
        self.sender.abort();
        if let Some(pinger) = &self.pinger {
            pinger.abort();
        }
    }
}

fn read_lines<R: BufRead>(input: R, tx: mpsc::Sender<String>) {
    for line in input.lines() {
        match line {
            Ok(line) => {
                if tx.blocking_send(line).is_err() {
                    // sender task is gone
                    break;
                }
            }
            Err(e) => {
                warn!("Input error: {e}");
                break;
            }
        }
    }
    debug!("Input reader finished");
}

async fn send_lines(
    session: DataChannelSession,
    console: Console,
    mut lines: mpsc::Receiver<String>,
) -> usize {
    let mut sent = 0;

    while let Some(line) = lines.recv().await {
        let text = line.trim_end_matches('\r');
        if text.trim().is_empty() {
            continue;
        }
        match session.send(text).await {
            Ok(_) => sent += 1,
            Err(e) => {
                console.emit_error(&e);
                if matches!(e, SessionError::ChannelNotOpen { .. })
                    && session.state() == ChannelState::Closed
                {
                    break;
                }
            }
        }
    }

    debug!("Message loop on '{}' ended after {sent} messages", session.label());
    sent
}

async fn ping(session: DataChannelSession, console: Console, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let message = random_alpha(PING_LEN);
        match session.send(&message).await {
            Ok(_) => console.emit_sent(&message),
            Err(e) => {
                console.emit_error(&e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::captured;
    use crate::peer::{event_channel, ConnectionConfig, ConnectionController, Role};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_sends_before_open_fail_fast() {
        let (tx, _rx) = event_channel();
        let controller =
            ConnectionController::create(&ConnectionConfig::default(), Role::Offerer, tx)
                .await
                .unwrap();
        let session = controller.create_channel("test").await.unwrap();
        let (console, sink) = captured();

        let input = Cursor::new("hello\n\nworld\n");
        let sent = MessageLoop::start(session, console, input).join().await;

        assert_eq!(sent, 0);
        let text = sink.text();
        assert_eq!(text.matches("data channel 'test' is not open").count(), 2);
    }

    #[tokio::test]
    async fn test_closed_channel_ends_loop() {
        let (tx, _rx) = event_channel();
        let controller =
            ConnectionController::create(&ConnectionConfig::default(), Role::Offerer, tx)
                .await
                .unwrap();
        let session = controller.create_channel("test").await.unwrap();
        session.close().await.unwrap();
        let (console, sink) = captured();

        let input = Cursor::new("one\ntwo\nthree\n");
        let sent = MessageLoop::start(session, console, input).join().await;

        assert_eq!(sent, 0);
        // stops at the first failure
        assert_eq!(sink.text().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_pings_stop_at_first_failure() {
        let (tx, _rx) = event_channel();
        let controller =
            ConnectionController::create(&ConnectionConfig::default(), Role::Offerer, tx)
                .await
                .unwrap();
        let session = controller.create_channel("test").await.unwrap();
        session.close().await.unwrap();
        let (console, sink) = captured();

        let message_loop = MessageLoop::start(session.clone(), console.clone(), Cursor::new(""))
            .with_pings(session, console, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(250)).await;

        // one failed ping, then nothing more
        assert_eq!(
            sink.text(),
            "[Error: data channel 'test' is not open]\n"
        );
        assert_eq!(message_loop.join().await, 0);
    }
}
