use std::fmt;
use tracing::{info, warn};

/// Candidate counts by type in one description
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSummary {
    pub host: usize,
    pub srflx: usize,
    pub prflx: usize,
    pub relay: usize,
}

impl CandidateSummary {
    /// Counts the `a=candidate` lines of an SDP text.
    pub fn from_sdp(sdp: &str) -> Self {
        let mut summary = CandidateSummary::default();

        for line in sdp.lines() {
            let Some(candidate) = line.trim().strip_prefix("a=candidate:") else {
                continue;
            };
            let typ = candidate
                .split_whitespace()
                .skip_while(|field| *field != "typ")
                .nth(1);
            match typ {
                Some("host") => summary.host += 1,
                Some("srflx") => summary.srflx += 1,
                Some("prflx") => summary.prflx += 1,
                Some("relay") => summary.relay += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.host + self.srflx + self.prflx + self.relay
    }

    /// Only host candidates: peers behind different NATs will not reach us.
    pub fn is_local_only(&self) -> bool {
        self.srflx == 0 && self.relay == 0
    }
}

impl fmt::Display for CandidateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} host, {} srflx, {} prflx, {} relay",
            self.host, self.srflx, self.prflx, self.relay
        )
    }
}

pub fn analyze_candidates(sdp: &str) -> CandidateSummary {
    let summary = CandidateSummary::from_sdp(sdp);
    info!("Candidate analysis: {summary}");

    if summary.total() == 0 {
        warn!("No ICE candidates were gathered; the peer will not be able to connect");
    } else if summary.is_local_only() {
        warn!("No server-reflexive or relay candidates found! Connection through NAT may fail.");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_candidate_types() {
        let sdp = "v=0\r\n\
a=candidate:1 1 udp 2130706431 192.168.1.10 50000 typ host\r\n\
a=candidate:2 1 udp 1694498815 203.0.113.5 50001 typ srflx raddr 192.168.1.10 rport 50000\r\n\
a=candidate:3 1 udp 16777215 198.51.100.7 3478 typ relay raddr 203.0.113.5 rport 50001\r\n\
a=candidate:4 1 udp 2130706431 10.0.0.2 50002 typ host\r\n\
a=end-of-candidates\r\n";

        let summary = CandidateSummary::from_sdp(sdp);
        assert_eq!(
            summary,
            CandidateSummary {
                host: 2,
                srflx: 1,
                prflx: 0,
                relay: 1
            }
        );
        assert!(!summary.is_local_only());
        assert_eq!(summary.to_string(), "2 host, 1 srflx, 0 prflx, 1 relay");
    }

    #[test]
    fn test_host_only() {
        let summary =
            CandidateSummary::from_sdp("a=candidate:1 1 udp 2130706431 10.0.0.2 50002 typ host");
        assert_eq!(summary.total(), 1);
        assert!(summary.is_local_only());
    }
}
