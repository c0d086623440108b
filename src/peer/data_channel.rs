use crate::error::{Result, SessionError};
use crate::peer::events::{EventSender, PeerEvent};
use crate::peer::state::ChannelState;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use webrtc::data_channel::{data_channel_message::DataChannelMessage, RTCDataChannel};

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// The application channel.
///
/// Cheap to clone; every clone refers to the same channel and state.
#[derive(Clone)]
pub struct DataChannelSession {
    inner: Arc<Inner>,
}

struct Inner {
    channel: Arc<RTCDataChannel>,
    label: String,
    state: Mutex<ChannelState>,
}

impl DataChannelSession {
    /// Wraps an engine channel and hooks its open/message/close callbacks.
    pub(crate) fn attach(channel: Arc<RTCDataChannel>, events: EventSender) -> Self {
        let initial = ChannelState::from(channel.ready_state());
        let session = DataChannelSession {
            inner: Arc::new(Inner {
                label: channel.label().to_owned(),
                channel: channel.clone(),
                state: Mutex::new(initial),
            }),
        };
        debug!(
            "Attached data channel '{}' in state {initial}",
            session.label()
        );

        // handlers hold weak references, the channel owns them
        let weak = Arc::downgrade(&session.inner);
        let tx = events.clone();
        channel.on_open(Box::new(move || {
            if let Some(session) = upgrade(&weak) {
                if session.transition(ChannelState::Open) {
                    info!("Data channel '{}' open", session.label());
                    let _ = tx.send(PeerEvent::ChannelOpen(session));
                }
            }
            Box::pin(async {})
        }));

        let weak = Arc::downgrade(&session.inner);
        let tx = events.clone();
        channel.on_close(Box::new(move || {
            if let Some(session) = upgrade(&weak) {
                if session.transition(ChannelState::Closed) {
                    info!("Data channel '{}' closed", session.label());
                    let _ = tx.send(PeerEvent::ChannelClosed(session));
                }
            }
            Box::pin(async {})
        }));

        let label = session.label().to_owned();
        let tx = events.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let event = match decode_text(msg.is_string, &msg.data) {
                Some(text) => PeerEvent::Message {
                    label: label.clone(),
                    text,
                },
                None => {
                    warn!(
                        "Ignoring non-text payload of {} bytes on '{label}'",
                        msg.data.len()
                    );
                    PeerEvent::UnsupportedPayload {
                        label: label.clone(),
                        len: msg.data.len(),
                    }
                }
            };
            let _ = tx.send(event);
            Box::pin(async {})
        }));

        // opened before the handler was in place
        if initial == ChannelState::Open {
            let _ = events.send(PeerEvent::ChannelOpen(session.clone()));
        }
        session
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    fn transition(&self, next: ChannelState) -> bool {
        let mut state = self.inner.state.lock();
        match state.advance(next) {
            Some(advanced) => {
                *state = advanced;
                true
            }
            None => false,
        }
    }

    fn not_open(&self) -> SessionError {
        SessionError::ChannelNotOpen {
            label: self.inner.label.clone(),
        }
    }

    /// Hands `text` to the engine's reliable ordered stream.
    ///
    /// Precondition: the channel is open. Sends before open or after close
    /// are rejected with `ChannelNotOpen` and nothing reaches the peer.
    pub async fn send(&self, text: &str) -> Result<usize> {
        if !self.is_open() {
            return Err(self.not_open());
        }

        match self.inner.channel.send_text(text.to_owned()).await {
            Ok(n) => Ok(n),
            Err(e) => {
                // closed underneath us between the check and the write
                let engine_state = ChannelState::from(self.inner.channel.ready_state());
                if !self.is_open() || engine_state != ChannelState::Open {
                    Err(self.not_open())
                } else {
                    Err(SessionError::Engine(e))
                }
            }
        }
    }

    /// Bytes queued in the engine and not yet sent.
    pub async fn buffered_amount(&self) -> usize {
        self.inner.channel.buffered_amount().await
    }

    /// Waits until the send buffer is empty. Returns false on timeout.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let pending = self.buffered_amount().await;
            if pending == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!("Abandoning {pending} unsent bytes on '{}'", self.label());
                return false;
            }
            sleep(DRAIN_POLL).await;
        }
    }

    pub async fn close(&self) -> Result<()> {
        if self.transition(ChannelState::Closed) {
            debug!("Closing data channel '{}'", self.label());
        }
        self.inner.channel.close().await?;
        Ok(())
    }
}

impl fmt::Debug for DataChannelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannelSession")
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

fn upgrade(weak: &Weak<Inner>) -> Option<DataChannelSession> {
    weak.upgrade().map(|inner| DataChannelSession { inner })
}

/// Text payloads only; binary or invalid UTF-8 yields `None`.
fn decode_text(is_string: bool, data: &Bytes) -> Option<String> {
    if !is_string {
        return None;
    }
    String::from_utf8(data.to_vec()).ok()
}
