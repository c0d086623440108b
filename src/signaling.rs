//! Copy-paste signaling.
//!
//! The producing side is driven by gathering events and prints the local
//! description once. The consuming side reads the peer's description from a
//! blocking line source until a blank line.

use crate::console::Console;
use crate::error::{Result, SessionError};
use crate::peer::codec;
use crate::peer::ice::analyze_candidates;
use crate::peer::{ConnectionController, GatheringState, Role, SdpPayload};
use crate::utils::check_code;
use std::io::{self, BufRead, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// How the local description is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptionFormat {
    /// base64(gzip(json)) on one line
    #[default]
    Compact,
    /// The SDP text itself
    Raw,
}

pub struct SignalingExchange {
    console: Console,
    format: DescriptionFormat,
    max_record_size: usize,
    emitted: AtomicBool,
}

impl SignalingExchange {
    pub fn new(console: Console, format: DescriptionFormat, max_record_size: usize) -> Self {
        Self {
            console,
            format,
            max_record_size,
            emitted: AtomicBool::new(false),
        }
    }

    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Producing side. Call for every gathering transition; on the first
    /// `Complete` the local description is printed and returned. Later calls
    /// return `None`.
    pub async fn on_gathering_state(
        &self,
        controller: &ConnectionController,
        state: GatheringState,
    ) -> Result<Option<String>> {
        if state != GatheringState::Complete || self.emitted.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let desc = controller.local_description().await.ok_or_else(|| {
            SessionError::illegal("gathering completed without a local description")
        })?;
        if self.emitted.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        analyze_candidates(&desc.sdp);
        let code = check_code(&desc.sdp);
        let kind = desc.sdp_type;
        let session_id = controller.session_id();

        let text = match self.format {
            DescriptionFormat::Compact => codec::encode(&SdpPayload {
                sdp: desc.clone(),
                id: session_id.clone(),
                ts: chrono::Utc::now().timestamp(),
            })?,
            DescriptionFormat::Raw => desc.sdp.clone(),
        };

        let header = format!(
            "Local {kind} for session {session_id} (check {code}), paste it into the {}:",
            match controller.role() {
                Role::Offerer => "answerer",
                Role::Answerer => "offerer",
            }
        );
        self.console.emit_description(&header, &text);
        info!("Local {kind} emitted, {} bytes", text.len());
        Ok(Some(text))
    }

    /// Consuming side: reads one record and applies it.
    ///
    /// Blocks on `reader`. On `EmptyDescription` the controller is not
    /// touched.
    pub async fn receive<R: BufRead>(
        &self,
        controller: &ConnectionController,
        reader: &mut R,
    ) -> Result<()> {
        let record = read_record(reader, self.max_record_size)?;
        self.accept(controller, &record).await
    }

    /// Applies an already read record.
    pub async fn accept(&self, controller: &ConnectionController, record: &str) -> Result<()> {
        if record.trim().is_empty() {
            return Err(SessionError::EmptyDescription);
        }
        controller.set_remote_description(record).await?;

        if let Some(remote) = controller.remote_description() {
            self.console.line(format!(
                "Remote description accepted for session {} (check {})",
                controller.session_id(),
                check_code(remote)
            ));
        }
        Ok(())
    }
}

/// Reads lines until a blank line or end of input, joining them with CRLF.
///
/// A record larger than `max_size` fails with `DescriptionTooLarge`; the
/// remaining lines of that record are still consumed. No more than
/// `max_size` bytes of a single line are held in memory.
pub fn read_record<R: BufRead>(reader: &mut R, max_size: usize) -> Result<String> {
    let mut record = String::new();
    let mut overflow = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        let (read, truncated) = read_bounded_line(reader, &mut line, max_size)?;
        if read == 0 {
            debug!("End of input while reading a description");
            break;
        }
        let text = String::from_utf8_lossy(&line);
        let content = text.trim_end_matches(['\r', '\n']);
        if content.trim().is_empty() {
            break;
        }
        if overflow {
            continue;
        }
        if truncated || record.len() + content.len() + 2 > max_size {
            overflow = true;
            record.clear();
            continue;
        }
        record.push_str(content);
        record.push_str("\r\n");
    }

    if overflow {
        return Err(SessionError::DescriptionTooLarge { limit: max_size });
    }
    if record.is_empty() {
        return Err(SessionError::EmptyDescription);
    }
    Ok(record)
}

/// Reads one line, keeping at most `limit + 1` bytes of it in `line`.
/// Returns the bytes kept and whether the rest of the line was skipped.
fn read_bounded_line<R: BufRead>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> io::Result<(usize, bool)> {
    let read = reader
        .by_ref()
        .take(limit as u64 + 1)
        .read_until(b'\n', line)?;
    if read <= limit || line.ends_with(b"\n") {
        return Ok((read, false));
    }

    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        match buf.iter().position(|b| *b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                break;
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
    Ok((read, true))
}
