use crate::peer::data_channel::DataChannelSession;
use crate::peer::state::{ConnectionState, GatheringState};
use tokio::sync::mpsc;

/// Everything the engine reports, in the order it reported it.
///
/// Engine callbacks only record state and push one of these; all reactions
/// happen in the single consumer of the stream.
#[derive(Debug)]
pub enum PeerEvent {
    ConnectionState(ConnectionState),
    GatheringState(GatheringState),
    /// Answerer only: the offerer's channel arrived.
    IncomingChannel(DataChannelSession),
    ChannelOpen(DataChannelSession),
    ChannelClosed(DataChannelSession),
    Message { label: String, text: String },
    UnsupportedPayload { label: String, len: usize },
}

pub type EventSender = mpsc::UnboundedSender<PeerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PeerEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
