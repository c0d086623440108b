pub mod codec;
pub mod connection;
pub mod data_channel;
pub mod events;
pub mod ice;
pub mod state;
pub mod types;

pub use connection::ConnectionController;
pub use data_channel::DataChannelSession;
pub use events::{event_channel, EventReceiver, EventSender, PeerEvent};
pub use state::{ChannelState, ConnectionState, GatheringState};
pub use types::{ConnectionConfig, IceServerKind, Role, SdpPayload, ServerConfig};
