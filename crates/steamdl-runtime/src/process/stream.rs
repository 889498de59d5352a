//! Async stream log readers (non-UTF8-safe).
//!
//! steamcmd can emit non-UTF8 bytes on stdout/stderr. Using
//! `BufReader::lines()` would terminate the reader task on invalid UTF-8, so
//! lines are read as bytes and decoded lossily.
//!
//! Progress updates are redrawn with a bare `\r`, so both `\r` and `\n` end
//! a line, and a line longer than [`MAX_LINE_BYTES`] is cut at that size.

use std::sync::Arc;
use steamdl_core::JobId;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use super::log::{JobLog, LogStream};

/// Longest line appended in one piece.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Byte splitter for `\n`, `\r` and `\r\n` terminated output.
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    /// Feed `chunk`, calling `emit` once per complete line.
    fn feed(&mut self, chunk: &[u8], mut emit: impl FnMut(&[u8])) {
        for &byte in chunk {
            match byte {
                // Second half of `\r\n`.
                b'\n' if self.after_cr => self.after_cr = false,
                b'\n' => {
                    emit(&self.pending);
                    self.pending.clear();
                }
                b'\r' => {
                    // Repeated redraws carry no text.
                    if !self.pending.is_empty() {
                        emit(&self.pending);
                        self.pending.clear();
                    }
                    self.after_cr = true;
                }
                _ => {
                    self.after_cr = false;
                    self.pending.push(byte);
                    if self.pending.len() >= MAX_LINE_BYTES {
                        emit(&self.pending);
                        self.pending.clear();
                    }
                }
            }
        }
    }

    /// Unterminated bytes left at EOF.
    fn finish(self) -> Option<Vec<u8>> {
        (!self.pending.is_empty()).then_some(self.pending)
    }
}

/// Copy `stream` into `log` line by line until EOF or a read error.
pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    job_id: JobId,
    kind: LogStream,
    log: Arc<JobLog>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut splitter = LineSplitter::default();
        let emit = |bytes: &[u8]| {
            let line = String::from_utf8_lossy(bytes).into_owned();
            debug!(target: "steamdl.steamcmd", job_id = %job_id, stream = kind.as_str(), "{line}");
            log.append(kind, line);
        };

        loop {
            let consumed = match reader.fill_buf().await {
                Ok([]) => break, // EOF
                Ok(chunk) => {
                    splitter.feed(chunk, &emit);
                    chunk.len()
                }
                Err(e) => {
                    debug!(job_id = %job_id, stream = kind.as_str(), error = %e, "log stream reader exiting due to read error");
                    break;
                }
            };
            reader.consume(consumed);
        }

        if let Some(rest) = splitter.finish() {
            emit(&rest);
        }
        debug!(job_id = %job_id, stream = kind.as_str(), "log stream reader task exiting");
    })
}
