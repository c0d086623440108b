use crate::error::{Result, SessionError};
use crate::utils::add_ice_url_scheme;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// SDP envelope exchanged between operators
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SdpPayload {
    pub sdp: RTCSessionDescription,
    pub id: String,
    pub ts: i64,
}

/// Which side of the handshake this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    /// Creates the data channel and the first description
    #[value(name = "offer", alias = "offerer")]
    Offerer,
    /// Answers a pasted offer and receives the channel
    #[value(name = "answer", alias = "answerer")]
    Answerer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offerer => f.write_str("offerer"),
            Role::Answerer => f.write_str("answerer"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IceServerKind {
    Stun,
    Turn,
}

/// One ICE server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub kind: IceServerKind,
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn stun(url: &str) -> Self {
        Self {
            kind: IceServerKind::Stun,
            url: add_ice_url_scheme(url, IceServerKind::Stun),
            username: None,
            credential: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(SessionError::InvalidConfig(
                "server URL cannot be empty".into(),
            ));
        }
        if self.kind == IceServerKind::Turn
            && (self.username.is_none() || self.credential.is_none())
        {
            return Err(SessionError::InvalidConfig(format!(
                "TURN server {} requires username and credential",
                self.url
            )));
        }
        Ok(())
    }

    pub fn to_rtc(&self) -> RTCIceServer {
        RTCIceServer {
            urls: vec![self.url.clone()],
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
        }
    }
}

/// Accepts `stun:host:port`, `turn:user:pass@host:port` and bare
/// `host:port` (treated as STUN, or TURN when credentials are present).
impl FromStr for ServerConfig {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SessionError::InvalidConfig(
                "server URL cannot be empty".into(),
            ));
        }

        let (scheme, rest) = match s.split_once(':') {
            Some((scheme, rest)) if matches!(scheme, "stun" | "stuns" | "turn" | "turns") => {
                (Some(scheme), rest)
            }
            _ => (None, s),
        };

        let (auth, host) = match rest.rsplit_once('@') {
            Some((auth, host)) => (Some(auth), host),
            None => (None, rest),
        };

        let (username, credential) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (Some(user.to_owned()), Some(pass.to_owned())),
                None => {
                    return Err(SessionError::InvalidConfig(format!(
                        "expected user:credential@host in {s}"
                    )))
                }
            },
            None => (None, None),
        };

        let kind = match scheme {
            Some(scheme) if scheme.starts_with("turn") => IceServerKind::Turn,
            Some(_) => IceServerKind::Stun,
            None if username.is_some() => IceServerKind::Turn,
            None => IceServerKind::Stun,
        };

        let url = match scheme {
            Some(scheme) => format!("{scheme}:{host}"),
            None => add_ice_url_scheme(host, kind),
        };

        let config = ServerConfig {
            kind,
            url,
            username,
            credential,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for one peer connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Tried in order by the gatherer.
    pub ice_servers: Vec<ServerConfig>,
}

impl ConnectionConfig {
    pub fn new(ice_servers: Vec<ServerConfig>) -> Self {
        Self { ice_servers }
    }

    pub fn validate(&self) -> Result<()> {
        self.ice_servers.iter().try_for_each(ServerConfig::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stun() {
        let server: ServerConfig = "stun:stun.l.google.com:19302".parse().unwrap();
        assert_eq!(server.kind, IceServerKind::Stun);
        assert_eq!(server.url, "stun:stun.l.google.com:19302");
        assert!(server.username.is_none());
    }

    #[test]
    fn test_parse_bare_host() {
        let server: ServerConfig = "stun.l.google.com:19302".parse().unwrap();
        assert_eq!(server.url, "stun:stun.l.google.com:19302");

        let server: ServerConfig = "alice:secret@relay.example.com:3478".parse().unwrap();
        assert_eq!(server.kind, IceServerKind::Turn);
        assert_eq!(server.url, "turn:relay.example.com:3478");
    }

    #[test]
    fn test_parse_turn_credentials() {
        let server: ServerConfig = "turn:alice:secret@relay.example.com:3478".parse().unwrap();
        assert_eq!(server.kind, IceServerKind::Turn);
        assert_eq!(server.url, "turn:relay.example.com:3478");
        assert_eq!(server.username.as_deref(), Some("alice"));
        assert_eq!(server.credential.as_deref(), Some("secret"));

        let rtc = server.to_rtc();
        assert_eq!(rtc.urls, vec!["turn:relay.example.com:3478".to_string()]);
        assert_eq!(rtc.username, "alice");
    }

    #[test]
    fn test_invalid_servers() {
        assert!("".parse::<ServerConfig>().is_err());
        // TURN without credentials
        assert!("turn:relay.example.com:3478".parse::<ServerConfig>().is_err());
        // credentials without separator
        assert!("turn:alice@relay.example.com".parse::<ServerConfig>().is_err());
    }

    #[test]
    fn test_empty_server_list_is_valid() {
        assert!(ConnectionConfig::default().validate().is_ok());
    }
}
