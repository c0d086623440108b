//! Operator-facing output.
//!
//! Every write takes the console lock for the whole record, so the input
//! loop and the event dispatcher never interleave partial lines.

use crate::error::SessionError;
use parking_lot::Mutex;
use std::fmt::Display;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    fn write_lines(&self, lines: &[&str]) {
        let mut out = self.out.lock();
        for line in lines {
            // a closed stdout is not worth crashing the session for
            let _ = writeln!(out, "{line}");
        }
        let _ = out.flush();
    }

    pub fn line(&self, text: impl Display) {
        self.write_lines(&[&text.to_string()]);
    }

    pub fn emit_state(&self, what: &str, state: impl Display) {
        self.line(format!("[{what}: {state}]"));
    }

    pub fn emit_message(&self, label: &str, text: &str) {
        self.line(format!("[Received on {label}: {text}]"));
    }

    pub fn emit_sent(&self, text: &str) {
        self.line(format!("[Sent: {text}]"));
    }

    pub fn emit_error(&self, err: &SessionError) {
        self.line(format!("[Error: {err}]"));
    }

    pub fn prompt(&self, text: &str) {
        self.line(text);
    }

    /// Prints a local description as one block followed by a blank line, so
    /// it can be pasted verbatim into the peer.
    pub fn emit_description(&self, header: &str, body: &str) {
        let mut lines = vec![header];
        lines.extend(body.lines());
        lines.push("");
        self.write_lines(&lines);
    }
}
