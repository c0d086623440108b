use crate::error::{Result, SessionError};
use crate::peer::codec::{self, DecodedRecord};
use crate::peer::data_channel::DataChannelSession;
use crate::peer::events::{EventSender, PeerEvent};
use crate::peer::state::{ConnectionState, GatheringState};
use crate::peer::types::{ConnectionConfig, Role};
use crate::utils::random_id;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::{
    api::APIBuilder,
    data_channel::{data_channel_init::RTCDataChannelInit, RTCDataChannel},
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        RTCPeerConnection,
    },
};

/// Owns the peer connection for one process and gates every handshake step
/// on its tracked state.
pub struct ConnectionController {
    pc: RTCPeerConnection,
    role: Role,
    session_id: Mutex<String>,
    state: Arc<Mutex<ConnectionState>>,
    gathering: Arc<Mutex<GatheringState>>,
    channel: Arc<Mutex<Option<DataChannelSession>>>,
    local: OnceCell<RTCSessionDescription>,
    remote: OnceCell<String>,
    applying_remote: tokio::sync::Mutex<()>,
    offer_started: AtomicBool,
    events: EventSender,
}

impl ConnectionController {
    /// Creates the peer connection and wires its callbacks into `events`.
    ///
    /// Fails only on invalid configuration or when the engine refuses to
    /// build the connection.
    pub async fn create(config: &ConnectionConfig, role: Role, events: EventSender) -> Result<Self> {
        config.validate()?;
        if config.ice_servers.is_empty() {
            warn!("No ICE servers configured, only host candidates will be gathered");
        }

        let api = APIBuilder::new().build();
        let pc = api.new_peer_connection(rtc_config(config)).await?;

        let controller = ConnectionController {
            pc,
            role,
            session_id: Mutex::new(random_id()),
            state: Arc::new(Mutex::new(ConnectionState::New)),
            gathering: Arc::new(Mutex::new(GatheringState::New)),
            channel: Arc::new(Mutex::new(None)),
            local: OnceCell::new(),
            remote: OnceCell::new(),
            applying_remote: tokio::sync::Mutex::new(()),
            offer_started: AtomicBool::new(false),
            events,
        };
        controller.register_handlers();
        info!(
            "Created peer connection as {role} with {} ICE server(s)",
            config.ice_servers.len()
        );
        Ok(controller)
    }

    fn register_handlers(&self) {
        self.pc.on_ice_candidate(Box::new(|cand: Option<RTCIceCandidate>| {
            match cand.map(|c| c.to_json()) {
                Some(Ok(init)) => debug!("Local candidate: {}", init.candidate),
                Some(Err(e)) => debug!("Unreadable local candidate: {e}"),
                // None marks the end of gathering
                None => debug!("ICE candidate gathering finished"),
            }
            Box::pin(async {})
        }));

        let gathering = self.gathering.clone();
        let tx = self.events.clone();
        self.pc
            .on_ice_gathering_state_change(Box::new(move |st: RTCIceGathererState| {
                if let Some(next) = GatheringState::from_gatherer(st) {
                    let changed = {
                        let mut current = gathering.lock();
                        let changed = *current != next;
                        *current = next;
                        changed
                    };
                    if changed {
                        debug!("ICE gathering state changed to: {next}");
                        let _ = tx.send(PeerEvent::GatheringState(next));
                    }
                }
                Box::pin(async {})
            }));

        let state = self.state.clone();
        let tx = self.events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
                let reported = ConnectionState::from(st);
                let advanced = {
                    let mut current = state.lock();
                    let advanced = current.advance(reported);
                    if let Some(next) = advanced {
                        *current = next;
                    }
                    advanced
                };
                match advanced {
                    Some(next) => {
                        info!("Peer connection state changed to: {next}");
                        let _ = tx.send(PeerEvent::ConnectionState(next));
                    }
                    None => debug!("Ignoring engine report {reported}"),
                }
                Box::pin(async {})
            }));

        if self.role == Role::Answerer {
            let slot = self.channel.clone();
            let tx = self.events.clone();
            self.pc
                .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                    let mut slot = slot.lock();
                    if slot.is_some() {
                        warn!("Ignoring extra data channel '{}'", dc.label());
                    } else {
                        info!("New DataChannel {}", dc.label());
                        let session = DataChannelSession::attach(dc, tx.clone());
                        *slot = Some(session.clone());
                        let _ = tx.send(PeerEvent::IncomingChannel(session));
                    }
                    Box::pin(async {})
                }));
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn session_id(&self) -> String {
        self.session_id.lock().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn gathering_state(&self) -> GatheringState {
        *self.gathering.lock()
    }

    pub fn channel(&self) -> Option<DataChannelSession> {
        self.channel.lock().clone()
    }

    pub fn remote_description(&self) -> Option<&str> {
        self.remote.get().map(String::as_str)
    }

    /// `ConnectionFailed` once the engine has given up.
    pub fn ensure_usable(&self) -> Result<()> {
        match self.connection_state() {
            ConnectionState::Failed => Err(SessionError::ConnectionFailed),
            ConnectionState::Closed => Err(SessionError::illegal("connection is closed")),
            _ => Ok(()),
        }
    }

    /// The complete local description, available once gathering is complete.
    /// The first value read is kept for the lifetime of the connection.
    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        if let Some(desc) = self.local.get() {
            return Some(desc.clone());
        }
        if self.gathering_state() != GatheringState::Complete {
            return None;
        }

        let desc = self.pc.local_description().await?;
        if desc.sdp.is_empty() {
            return None;
        }
        let _ = self.local.set(desc);
        self.local.get().cloned()
    }

    /// Offerer only: creates the application channel before the offer so the
    /// description carries it. The session exists now but is not open.
    pub async fn create_channel(&self, label: &str) -> Result<DataChannelSession> {
        if self.role != Role::Offerer {
            return Err(SessionError::illegal(
                "only the offerer creates the data channel",
            ));
        }
        if self.offer_started.load(Ordering::SeqCst) {
            return Err(SessionError::illegal(
                "the data channel must be created before the offer",
            ));
        }
        self.ensure_usable()?;

        if self.channel().is_some() {
            return Err(SessionError::illegal("a data channel already exists"));
        }

        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self.pc.create_data_channel(label, Some(init)).await?;

        let session = DataChannelSession::attach(dc, self.events.clone());
        let raced = {
            let mut slot = self.channel.lock();
            if slot.is_some() {
                true
            } else {
                *slot = Some(session.clone());
                false
            }
        };
        if raced {
            let _ = session.close().await;
            return Err(SessionError::illegal("a data channel already exists"));
        }
        info!("Created data channel '{label}'");
        Ok(session)
    }

    /// Offerer only: creates the offer and starts gathering. The description
    /// is emitted on `GatheringState::Complete`.
    pub async fn start_offer(&self) -> Result<()> {
        if self.role != Role::Offerer {
            return Err(SessionError::illegal("the answerer does not create offers"));
        }
        if self.channel().is_none() {
            return Err(SessionError::illegal(
                "create the data channel before the offer",
            ));
        }
        if self.offer_started.swap(true, Ordering::SeqCst) {
            return Err(SessionError::illegal("the offer was already created"));
        }
        self.ensure_usable()?;

        debug!("Creating offer...");
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer).await?;
        Ok(())
    }

    /// Applies the peer's description. Allowed exactly once, while the
    /// connection is New or Connecting. The answerer then creates and applies
    /// its answer, which starts its own gathering.
    pub async fn set_remote_description(&self, text: &str) -> Result<()> {
        let _applying = self
            .applying_remote
            .try_lock()
            .map_err(|_| SessionError::illegal("a remote description is already being applied"))?;

        if self.remote.get().is_some() {
            return Err(SessionError::illegal("the remote description is already set"));
        }
        let state = self.connection_state();
        if !state.accepts_remote_description() {
            return Err(SessionError::illegal(format!(
                "cannot apply a remote description while {state}"
            )));
        }
        if self.role == Role::Offerer && !self.offer_started.load(Ordering::SeqCst) {
            return Err(SessionError::illegal(
                "create the offer before applying the answer",
            ));
        }

        let expected = match self.role {
            Role::Offerer => RTCSdpType::Answer,
            Role::Answerer => RTCSdpType::Offer,
        };
        let DecodedRecord {
            description,
            session_id,
        } = codec::decode(text, expected)?;
        self.adopt_session_id(session_id);

        let sdp = description.sdp.clone();
        self.pc
            .set_remote_description(description)
            .await
            .map_err(SessionError::invalid)?;
        let _ = self.remote.set(sdp);
        info!("Remote {expected} applied");

        if self.role == Role::Answerer {
            debug!("Creating answer...");
            let answer = self.pc.create_answer(None).await?;
            self.pc.set_local_description(answer).await?;
        }
        Ok(())
    }

    fn adopt_session_id(&self, remote_id: Option<String>) {
        let Some(remote_id) = remote_id else {
            return;
        };
        let mut id = self.session_id.lock();
        match self.role {
            Role::Answerer => *id = remote_id,
            Role::Offerer if *id != remote_id => {
                warn!("Answer belongs to session {remote_id}, expected {}", *id)
            }
            Role::Offerer => {}
        }
    }

    /// Drains pending sends (bounded by `drain_timeout`), closes the channel
    /// and the connection. Safe to call more than once.
    pub async fn shutdown(&self, drain_timeout: Duration) -> Result<()> {
        if let Some(channel) = self.channel() {
            if channel.is_open() {
                channel.drain(drain_timeout).await;
            }
            if let Err(e) = channel.close().await {
                debug!("Closing data channel failed: {e}");
            }
        }

        let closed = {
            let mut state = self.state.lock();
            let next = state.advance(ConnectionState::Closed);
            if let Some(next) = next {
                *state = next;
            }
            next.is_some()
        };
        if closed {
            info!("Closing peer connection");
            let _ = self.events.send(PeerEvent::ConnectionState(ConnectionState::Closed));
        }
        self.pc.close().await?;
        Ok(())
    }
}

/// Builds the engine configuration
fn rtc_config(config: &ConnectionConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: config.ice_servers.iter().map(|s| s.to_rtc()).collect(),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}
