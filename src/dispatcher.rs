use crate::console::Console;
use crate::error::SessionError;
use crate::message_loop::MessageLoop;
use crate::peer::{ConnectionController, ConnectionState, EventReceiver, PeerEvent};
use crate::signaling::SignalingExchange;
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, warn};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    ConnectionFailed,
    ConnectionClosed,
    ChannelClosed,
    HandshakeAborted,
    Interrupted,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownReason::ConnectionFailed => "peer connection failed",
            ShutdownReason::ConnectionClosed => "peer connection closed",
            ShutdownReason::ChannelClosed => "data channel closed",
            ShutdownReason::HandshakeAborted => "handshake aborted",
            ShutdownReason::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Single consumer of the engine event stream.
///
/// Events are handled one at a time in arrival order, so handlers never
/// race each other on controller or session state.
pub struct Dispatcher<R> {
    controller: Arc<ConnectionController>,
    exchange: Arc<SignalingExchange>,
    console: Console,
    described: Option<oneshot::Sender<String>>,
    input: Option<R>,
    ping_interval: Option<Duration>,
    message_loop: Option<MessageLoop>,
    stop: Arc<Notify>,
}

impl<R> Dispatcher<R>
where
    R: BufRead + Send + 'static,
{
    /// `described` receives the local description once it is printed;
    /// `input` feeds the message loop once the channel opens.
    pub fn new(
        controller: Arc<ConnectionController>,
        exchange: Arc<SignalingExchange>,
        console: Console,
        described: oneshot::Sender<String>,
        input: R,
    ) -> Self {
        Self {
            controller,
            exchange,
            console,
            described: Some(described),
            input: Some(input),
            ping_interval: None,
            message_loop: None,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Notifying the handle makes `run` return `Interrupted` after the
    /// event in progress, with the message loop stopped.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    pub async fn run(mut self, mut events: EventReceiver) -> ShutdownReason {
        let stop = self.stop.clone();
        let reason = loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = stop.notified() => {
                    debug!("Event dispatch stopped");
                    break ShutdownReason::Interrupted;
                }
            };
            let Some(event) = event else {
                debug!("Event stream ended");
                break ShutdownReason::ConnectionClosed;
            };
            if let Some(reason) = self.handle(event).await {
                break reason;
            }
        };

        if let Some(message_loop) = self.message_loop.take() {
            message_loop.abort();
        }
        reason
    }

    async fn handle(&mut self, event: PeerEvent) -> Option<ShutdownReason> {
        match event {
            PeerEvent::ConnectionState(state) => {
                self.console.emit_state("State", state);
                match state {
                    ConnectionState::Failed => {
                        error!("Peer connection has gone to failed");
                        self.console.emit_error(&SessionError::ConnectionFailed);
                        return Some(ShutdownReason::ConnectionFailed);
                    }
                    ConnectionState::Closed => return Some(ShutdownReason::ConnectionClosed),
                    ConnectionState::Disconnected => {
                        warn!("Peer connection disconnected, waiting for the engine to recover");
                    }
                    _ => {}
                }
            }

            PeerEvent::GatheringState(state) => {
                self.console.emit_state("Gathering State", state);
                match self.exchange.on_gathering_state(&self.controller, state).await {
                    Ok(Some(text)) => {
                        if let Some(tx) = self.described.take() {
                            let _ = tx.send(text);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => self.console.emit_error(&e),
                }
            }

            PeerEvent::IncomingChannel(session) => {
                self.console
                    .line(format!("[New DataChannel: {}]", session.label()));
            }

            PeerEvent::ChannelOpen(session) => {
                self.console.emit_state("DataChannel open", session.label());
                self.start_message_loop(session);
            }

            PeerEvent::ChannelClosed(session) => {
                self.console.emit_state("DataChannel closed", session.label());
                return Some(ShutdownReason::ChannelClosed);
            }

            PeerEvent::Message { label, text } => self.console.emit_message(&label, &text),

            PeerEvent::UnsupportedPayload { label, len } => {
                debug!("Dropped {len} byte binary payload on '{label}'");
            }
        }
        None
    }

    fn start_message_loop(&mut self, session: crate::peer::DataChannelSession) {
        let Some(input) = self.input.take() else {
            debug!("Message loop already running");
            return;
        };

        self.console.prompt(&format!(
            "Type a message and press Enter to send it on '{}'",
            session.label()
        ));
        let mut message_loop = MessageLoop::start(session.clone(), self.console.clone(), input);
        if let Some(interval) = self.ping_interval {
            message_loop = message_loop.with_pings(session, self.console.clone(), interval);
        }
        self.message_loop = Some(message_loop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::tests::captured;
    use crate::peer::{event_channel, ConnectionConfig, GatheringState, Role};
    use crate::signaling::DescriptionFormat;
    use std::io::Cursor;

    async fn setup(
        role: Role,
    ) -> (
        Arc<ConnectionController>,
        Dispatcher<Cursor<&'static str>>,
        crate::console::tests::Captured,
    ) {
        let (tx, _rx) = event_channel();
        let controller = Arc::new(
            ConnectionController::create(&ConnectionConfig::default(), role, tx)
                .await
                .unwrap(),
        );
        let (console, sink) = captured();
        let exchange = Arc::new(SignalingExchange::new(
            console.clone(),
            DescriptionFormat::Compact,
            1024,
        ));
        let (described, _) = oneshot::channel();
        let dispatcher = Dispatcher::new(
            controller.clone(),
            exchange,
            console,
            described,
            Cursor::new(""),
        );
        (controller, dispatcher, sink)
    }

    #[tokio::test]
    async fn test_messages_are_printed_in_order() {
        let (_controller, dispatcher, sink) = setup(Role::Answerer).await;
        let (tx, rx) = event_channel();
        for i in 0..3 {
            tx.send(PeerEvent::Message {
                label: "test".into(),
                text: format!("message {i}"),
            })
            .unwrap();
        }
        tx.send(PeerEvent::UnsupportedPayload {
            label: "test".into(),
            len: 4,
        })
        .unwrap();
        drop(tx);

        assert_eq!(dispatcher.run(rx).await, ShutdownReason::ConnectionClosed);
        assert_eq!(
            sink.text(),
            "[Received on test: message 0]\n[Received on test: message 1]\n[Received on test: message 2]\n"
        );
    }

    #[tokio::test]
    async fn test_failure_stops_dispatch() {
        let (_controller, dispatcher, sink) = setup(Role::Offerer).await;
        let (tx, rx) = event_channel();
        tx.send(PeerEvent::ConnectionState(ConnectionState::Connecting))
            .unwrap();
        tx.send(PeerEvent::ConnectionState(ConnectionState::Failed))
            .unwrap();
        tx.send(PeerEvent::Message {
            label: "test".into(),
            text: "never printed".into(),
        })
        .unwrap();

        assert_eq!(dispatcher.run(rx).await, ShutdownReason::ConnectionFailed);
        let text = sink.text();
        assert!(text.contains("[State: connecting]"));
        assert!(text.contains("peer connection failed"));
        assert!(!text.contains("never printed"));
    }

    /// Endless operator input: "hi" forever.
    struct Chatter;

    impl std::io::Read for Chatter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let data = b"hi\n";
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            Ok(n)
        }
    }

    #[tokio::test]
    async fn test_stop_ends_message_loop() {
        let (tx, _rx) = event_channel();
        let controller = Arc::new(
            ConnectionController::create(&ConnectionConfig::default(), Role::Offerer, tx)
                .await
                .unwrap(),
        );
        let session = controller.create_channel("test").await.unwrap();
        let (console, sink) = captured();
        let exchange = Arc::new(SignalingExchange::new(
            console.clone(),
            DescriptionFormat::Compact,
            1024,
        ));
        let (described, _) = oneshot::channel();
        let dispatcher = Dispatcher::new(
            controller,
            exchange,
            console,
            described,
            std::io::BufReader::new(Chatter),
        );
        let stop = dispatcher.stop_handle();

        let (events, rx) = event_channel();
        events.send(PeerEvent::ChannelOpen(session)).unwrap();
        let run = tokio::spawn(dispatcher.run(rx));

        // the loop keeps reporting sends on the unopened channel
        while !sink.text().contains("[Error:") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.notify_one();
        assert_eq!(run.await.unwrap(), ShutdownReason::Interrupted);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = sink.text().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.text().len(), settled);
    }

    #[tokio::test]
    async fn test_channel_close_ends_session() {
        let (controller, dispatcher, sink) = setup(Role::Offerer).await;
        let session = controller.create_channel("test").await.unwrap();
        let (tx, rx) = event_channel();
        tx.send(PeerEvent::GatheringState(GatheringState::Gathering))
            .unwrap();
        tx.send(PeerEvent::ChannelClosed(session)).unwrap();

        assert_eq!(dispatcher.run(rx).await, ShutdownReason::ChannelClosed);
        assert!(sink.text().ends_with("[DataChannel closed: test]\n"));
    }
}
