//! Session description codec.
//!
//! The compact form is `base64(gzip(json(SdpPayload)))`. Decoding also takes
//! base64 of plain JSON, a JSON object, or raw SDP text, so descriptions from
//! other tools can be pasted as-is.

use crate::error::{Result, SessionError};
use crate::peer::state::MAX_DECOMPRESSED_SIZE;
use crate::peer::types::SdpPayload;
use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::Deserialize;
use std::io::{self, Read, Write};
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A description accepted from the operator.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub description: RTCSessionDescription,
    /// Present when the peer sent an `SdpPayload` envelope.
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Payload(SdpPayload),
    Bare(RTCSessionDescription),
}

impl From<Envelope> for DecodedRecord {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope::Payload(p) => DecodedRecord {
                description: p.sdp,
                session_id: Some(p.id),
            },
            Envelope::Bare(description) => DecodedRecord {
                description,
                session_id: None,
            },
        }
    }
}

pub fn encode(p: &SdpPayload) -> Result<String> {
    // 1. JSON -> bytes
    let json = serde_json::to_vec(p).map_err(io::Error::from)?;

    // 2. GZIP compress
    let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
    gz.write_all(&json)?;
    let compressed = gz.finish()?;

    // 3. base64
    Ok(general_purpose::STANDARD.encode(compressed))
}

/// Decodes a pasted record and checks it is a parseable description of the
/// `expected` type.
pub fn decode(text: &str, expected: RTCSdpType) -> Result<DecodedRecord> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EmptyDescription);
    }

    let record = if trimmed.starts_with("v=") {
        decode_raw(trimmed, expected)?
    } else if trimmed.starts_with('{') {
        decode_json(trimmed.as_bytes())?
    } else {
        decode_blob(trimmed)?
    };

    let actual = record.description.sdp_type;
    if actual != expected {
        return Err(SessionError::invalid(format!(
            "expected an {expected}, received {actual}"
        )));
    }
    record
        .description
        .unmarshal()
        .map_err(|e| SessionError::invalid(format!("unparsable SDP: {e}")))?;

    Ok(record)
}

fn decode_raw(sdp: &str, expected: RTCSdpType) -> Result<DecodedRecord> {
    // normalize to the canonical CRLF line ending
    let mut normalized = sdp
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\r\n");
    normalized.push_str("\r\n");

    let description = match expected {
        RTCSdpType::Offer => RTCSessionDescription::offer(normalized),
        RTCSdpType::Answer => RTCSessionDescription::answer(normalized),
        other => {
            return Err(SessionError::invalid(format!(
                "raw SDP cannot be read as {other}"
            )))
        }
    }
    .map_err(|e| SessionError::invalid(format!("unparsable SDP: {e}")))?;

    Ok(DecodedRecord {
        description,
        session_id: None,
    })
}

fn decode_json(json: &[u8]) -> Result<DecodedRecord> {
    serde_json::from_slice::<Envelope>(json)
        .map(DecodedRecord::from)
        .map_err(|e| SessionError::invalid(format!("not a session description: {e}")))
}

fn decode_blob(blob: &str) -> Result<DecodedRecord> {
    // pasted blobs may wrap over several lines
    let compact: String = blob.split_whitespace().collect();

    // 1. base64 -> bytes
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SessionError::invalid(format!("not base64: {e}")))?;

    // 2. optional gunzip
    let json = if bytes.starts_with(&GZIP_MAGIC) {
        gunzip_limited(&bytes)?
    } else {
        bytes
    };

    // 3. JSON -> struct
    decode_json(&json)
}

fn gunzip_limited(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut json = Vec::new();
    GzDecoder::new(compressed)
        .take(MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut json)
        .map_err(|e| SessionError::invalid(format!("corrupt compressed description: {e}")))?;

    if json.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(SessionError::invalid(format!(
            "decompressed description exceeds {MAX_DECOMPRESSED_SIZE} bytes"
        )));
    }
    Ok(json)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const OFFER_SDP: &str = "v=0\r\n\
o=- 4215775240449105457 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:EsAw\r\n\
a=ice-pwd:bP+XJMM09aR8AiX1jdukzR6Y\r\n\
a=fingerprint:sha-256 0F:74:31:25:CB:A2:13:EC:28:6F:6D:2C:61:FF:5D:C2:BC:B9:DB:3D:98:14:8D:1A:BB:EA:33:0C:A4:60:A8:8E\r\n\
a=setup:actpass\r\n\
a=mid:0\r\n\
a=sctp-port:5000\r\n";

    fn offer() -> RTCSessionDescription {
        RTCSessionDescription::offer(OFFER_SDP.to_owned()).unwrap()
    }

    #[test]
    fn test_compact_blob_keeps_session_id() {
        let payload = SdpPayload {
            sdp: offer(),
            id: "00112233aabbccdd".into(),
            ts: 1_700_000_000,
        };
        let blob = encode(&payload).unwrap();
        assert!(!blob.contains('\n'));

        let record = decode(&blob, RTCSdpType::Offer).unwrap();
        assert_eq!(record.session_id.as_deref(), Some("00112233aabbccdd"));
        assert_eq!(record.description.sdp, OFFER_SDP);
    }

    #[test]
    fn test_wrapped_blob() {
        let payload = SdpPayload {
            sdp: offer(),
            id: "id".into(),
            ts: 0,
        };
        let blob = encode(&payload).unwrap();
        let (head, tail) = blob.split_at(blob.len() / 2);
        let wrapped = format!("{head}\r\n{tail}\r\n");

        assert!(decode(&wrapped, RTCSdpType::Offer).is_ok());
    }

    #[test]
    fn test_plain_base64_json() {
        // single-line base64 JSON, the format of the original demo programs
        let json = serde_json::to_string(&offer()).unwrap();
        let blob = general_purpose::STANDARD.encode(json);

        let record = decode(&blob, RTCSdpType::Offer).unwrap();
        assert!(record.session_id.is_none());
        assert_eq!(record.description.sdp_type, RTCSdpType::Offer);
    }

    #[test]
    fn test_raw_sdp_with_lf_endings() {
        let lf = OFFER_SDP.replace("\r\n", "\n");
        let record = decode(&lf, RTCSdpType::Offer).unwrap();
        assert_eq!(record.description.sdp, OFFER_SDP);
    }

    #[test]
    fn test_type_mismatch() {
        let json = serde_json::to_string(&offer()).unwrap();
        let err = decode(&json, RTCSdpType::Answer).unwrap_err();
        assert!(matches!(err, SessionError::InvalidDescription(_)));
    }

    #[test]
    fn test_garbage() {
        for text in ["not a description", "{\"type\":\"offer\"}", "aGVsbG8="] {
            let err = decode(text, RTCSdpType::Offer).unwrap_err();
            assert!(
                matches!(err, SessionError::InvalidDescription(_)),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_blank_is_empty() {
        assert!(matches!(
            decode(" \r\n\r\n", RTCSdpType::Offer),
            Err(SessionError::EmptyDescription)
        ));
    }

    #[test]
    fn test_decompression_limit() {
        let huge = vec![b' '; MAX_DECOMPRESSED_SIZE as usize + 10];
        let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
        gz.write_all(&huge).unwrap();
        let blob = general_purpose::STANDARD.encode(gz.finish().unwrap());

        let err = decode(&blob, RTCSdpType::Offer).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }
}
