use std::fmt;
use std::time::Duration;
use webrtc::{
    data_channel::data_channel_state::RTCDataChannelState,
    ice_transport::ice_gatherer_state::RTCIceGathererState,
    peer_connection::peer_connection_state::RTCPeerConnectionState,
};

/// ========== CONNECTION STATE ==========

/// Lifecycle of the peer connection as tracked by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }

    /// A remote description may only be applied before connectivity is up.
    pub fn accepts_remote_description(self) -> bool {
        matches!(self, ConnectionState::New | ConnectionState::Connecting)
    }

    /// Next tracked state for an engine report, `None` when the report is
    /// ignored. Closed absorbs everything, Failed only moves to Closed.
    pub fn advance(self, reported: ConnectionState) -> Option<ConnectionState> {
        match (self, reported) {
            (ConnectionState::Closed, _) => None,
            (ConnectionState::Failed, ConnectionState::Closed) => Some(ConnectionState::Closed),
            (ConnectionState::Failed, _) => None,
            (current, next) if current == next => None,
            (_, next) => Some(next),
        }
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => {
                ConnectionState::New
            }
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// ========== GATHERING STATE ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

impl GatheringState {
    /// The gatherer reports `Closed` when the connection shuts down; that is
    /// not a gathering transition and is dropped.
    pub fn from_gatherer(state: RTCIceGathererState) -> Option<Self> {
        match state {
            RTCIceGathererState::Unspecified | RTCIceGathererState::New => {
                Some(GatheringState::New)
            }
            RTCIceGathererState::Gathering => Some(GatheringState::Gathering),
            RTCIceGathererState::Complete => Some(GatheringState::Complete),
            RTCIceGathererState::Closed => None,
        }
    }
}

impl fmt::Display for GatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatheringState::New => "new",
            GatheringState::Gathering => "gathering",
            GatheringState::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// ========== CHANNEL STATE ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

impl ChannelState {
    /// Connecting → Open → Closed, with Connecting → Closed allowed.
    /// Returns `None` for transitions that must not happen (reopen, repeat).
    pub fn advance(self, next: ChannelState) -> Option<ChannelState> {
        match (self, next) {
            (ChannelState::Connecting, ChannelState::Open)
            | (ChannelState::Connecting, ChannelState::Closed)
            | (ChannelState::Open, ChannelState::Closed) => Some(next),
            _ => None,
        }
    }
}

impl From<RTCDataChannelState> for ChannelState {
    fn from(state: RTCDataChannelState) -> Self {
        match state {
            RTCDataChannelState::Unspecified | RTCDataChannelState::Connecting => {
                ChannelState::Connecting
            }
            RTCDataChannelState::Open => ChannelState::Open,
            RTCDataChannelState::Closing | RTCDataChannelState::Closed => ChannelState::Closed,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// ========== CONSTANTS ==========

/// Used when no ICE server is given on the command line.
pub const DEFAULT_ICE_SERVER: &str = "stun:stun.l.google.com:19302";

pub const DEFAULT_CHANNEL_LABEL: &str = "test";

/// Upper bound for one pasted signaling record.
pub const MAX_DESCRIPTION_SIZE: usize = 64 * 1024;

/// Upper bound for a gunzipped description (zip-bomb guard).
pub const MAX_DECOMPRESSED_SIZE: u64 = 256 * 1024;

/// How long shutdown waits for the send buffer to empty.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Length of the random strings sent by the periodic sender.
pub const PING_LEN: usize = 15;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_advance() {
        use ConnectionState::*;

        assert_eq!(New.advance(Connecting), Some(Connecting));
        assert_eq!(Connecting.advance(Connected), Some(Connected));
        assert_eq!(Connected.advance(Disconnected), Some(Disconnected));
        assert_eq!(Disconnected.advance(Connected), Some(Connected));
        assert_eq!(Connected.advance(Connected), None);

        // terminal states
        assert_eq!(Failed.advance(Connected), None);
        assert_eq!(Failed.advance(Closed), Some(Closed));
        assert_eq!(Closed.advance(New), None);
        assert_eq!(Closed.advance(Failed), None);
    }

    #[test]
    fn test_remote_description_window() {
        assert!(ConnectionState::New.accepts_remote_description());
        assert!(ConnectionState::Connecting.accepts_remote_description());
        assert!(!ConnectionState::Connected.accepts_remote_description());
        assert!(!ConnectionState::Failed.accepts_remote_description());
        assert!(!ConnectionState::Closed.accepts_remote_description());
    }

    #[test]
    fn test_channel_state_never_reopens() {
        use ChannelState::*;

        assert_eq!(Connecting.advance(Open), Some(Open));
        assert_eq!(Open.advance(Closed), Some(Closed));
        assert_eq!(Connecting.advance(Closed), Some(Closed));
        assert_eq!(Open.advance(Open), None);
        assert_eq!(Closed.advance(Open), None);
        assert_eq!(Closed.advance(Closed), None);
    }

    #[test]
    fn test_engine_state_mapping() {
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Unspecified),
            ConnectionState::New
        );
        assert_eq!(
            GatheringState::from_gatherer(RTCIceGathererState::Complete),
            Some(GatheringState::Complete)
        );
        assert_eq!(GatheringState::from_gatherer(RTCIceGathererState::Closed), None);
        assert_eq!(
            ChannelState::from(RTCDataChannelState::Closing),
            ChannelState::Closed
        );
    }
}
