use crate::peer::types::IceServerKind;
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Random alphanumeric string for the periodic sender
pub fn random_alpha(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Short code operators can read aloud to compare descriptions:
/// 6 bytes of SHA-256, 12 hex chars.
pub fn check_code(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..6])
}

// Adds the protocol scheme to an ICE server URL when it is missing
pub fn add_ice_url_scheme(url: &str, kind: IceServerKind) -> String {
    if ["stun:", "stuns:", "turn:", "turns:"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
    {
        url.to_owned()
    } else {
        let scheme = match kind {
            IceServerKind::Turn => "turn:",
            IceServerKind::Stun => "stun:",
        };
        format!("{scheme}{url}")
    }
}
