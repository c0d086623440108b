// Application configuration.
// Logging is verbose in debug builds and quiet in release builds; RUST_LOG
// overrides both.

use crate::error::Result;
use crate::peer::state::{DEFAULT_CHANNEL_LABEL, DEFAULT_ICE_SERVER, MAX_DESCRIPTION_SIZE};
use crate::peer::{ConnectionConfig, Role, ServerConfig};
use crate::signaling::DescriptionFormat;
use clap::Parser;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "ssc_lib=debug,ssc=debug,webrtc=warn";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser, Debug)]
#[command(name = "ssc")]
#[command(about = "Peer-to-peer chat over a WebRTC data channel, signaled by copy-paste")]
pub struct Cli {
    /// Which side of the handshake to play
    #[arg(value_enum)]
    pub role: Role,

    /// ICE server, e.g. stun:host:port or turn:user:pass@host:port (repeatable)
    #[arg(long = "ice-server", value_name = "URL")]
    pub ice_servers: Vec<String>,

    /// Do not add the default STUN server when no --ice-server is given
    #[arg(long)]
    pub no_default_ice: bool,

    /// Data channel label (offerer only)
    #[arg(long, default_value = DEFAULT_CHANNEL_LABEL)]
    pub label: String,

    /// Print the raw SDP instead of the compact blob
    #[arg(long)]
    pub raw: bool,

    /// Also send a random string every SECS seconds
    #[arg(long, value_name = "SECS")]
    pub ping_interval: Option<u64>,

    /// Largest accepted pasted description
    #[arg(long, value_name = "BYTES", default_value_t = MAX_DESCRIPTION_SIZE)]
    pub max_description_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: Role,
    pub connection: ConnectionConfig,
    pub label: String,
    pub format: DescriptionFormat,
    pub ping_interval: Option<Duration>,
    pub max_description_size: usize,
    pub log_filter: String,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let mut ice_servers = cli
            .ice_servers
            .iter()
            .map(|s| s.parse::<ServerConfig>())
            .collect::<Result<Vec<_>>>()?;
        if ice_servers.is_empty() && !cli.no_default_ice {
            ice_servers.push(ServerConfig::stun(DEFAULT_ICE_SERVER));
        }

        Ok(Config {
            role: cli.role,
            connection: ConnectionConfig::new(ice_servers),
            label: cli.label,
            format: if cli.raw {
                DescriptionFormat::Raw
            } else {
                DescriptionFormat::Compact
            },
            ping_interval: cli.ping_interval.filter(|s| *s > 0).map(Duration::from_secs),
            max_description_size: cli.max_description_size,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::peer::IceServerKind;

    fn parse(args: &[&str]) -> Result<Config> {
        let cli = Cli::try_parse_from(std::iter::once("ssc").chain(args.iter().copied()))
            .expect("valid arguments");
        Config::from_cli(cli)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["offer"]).unwrap();
        assert_eq!(config.role, Role::Offerer);
        assert_eq!(config.label, "test");
        assert_eq!(config.format, DescriptionFormat::Compact);
        assert_eq!(config.max_description_size, MAX_DESCRIPTION_SIZE);
        assert!(config.ping_interval.is_none());
        assert_eq!(
            config.connection.ice_servers,
            vec![ServerConfig::stun(DEFAULT_ICE_SERVER)]
        );
    }

    #[test]
    fn test_servers_in_order() {
        let config = parse(&[
            "answer",
            "--ice-server",
            "stun.example.com:3478",
            "--ice-server",
            "turn:alice:secret@relay.example.com:3478",
            "--raw",
            "--ping-interval",
            "5",
        ])
        .unwrap();
        assert_eq!(config.role, Role::Answerer);
        assert_eq!(config.format, DescriptionFormat::Raw);
        assert_eq!(config.ping_interval, Some(Duration::from_secs(5)));

        let servers = &config.connection.ice_servers;
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].url, "stun:stun.example.com:3478");
        assert_eq!(servers[1].kind, IceServerKind::Turn);
    }

    #[test]
    fn test_no_default_ice() {
        let config = parse(&["offerer", "--no-default-ice"]).unwrap();
        assert!(config.connection.ice_servers.is_empty());
    }

    #[test]
    fn test_invalid_server() {
        let err = parse(&["offer", "--ice-server", "turn:relay.example.com"]).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }
}
