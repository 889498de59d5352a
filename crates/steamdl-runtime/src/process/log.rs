//! Per-job captured output.
//!
//! Each job owns one [`JobLog`]: a bounded ring of recent lines addressed by
//! a monotonically increasing sequence number, a broadcast channel for live
//! followers and an optional spill file that receives every line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::warn;

use super::progress::parse_progress;

/// Capacity of the live broadcast channel per job.
const LIVE_CHANNEL_CAPACITY: usize = 1024;

/// Which pipe a line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Lines written by the orchestrator itself.
    System,
}

impl LogStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::System => "system",
        }
    }
}

/// A single captured line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub seq: u64,
    pub stream: LogStream,
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Result of reading from a cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    pub lines: Vec<LogLine>,
    /// Cursor to pass on the next read.
    pub next: u64,
    /// Lines between the requested cursor and the oldest retained line
    /// that were evicted.
    pub dropped: u64,
}

struct LogRing {
    lines: VecDeque<LogLine>,
    capacity: usize,
    next_seq: u64,
    progress: Option<f32>,
    spill: Option<LineWriter<File>>,
}

pub struct JobLog {
    ring: RwLock<LogRing>,
    live: broadcast::Sender<LogLine>,
}

impl JobLog {
    /// Empty log keeping at most `capacity` lines in memory.
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            ring: RwLock::new(LogRing {
                lines: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                next_seq: 0,
                progress: None,
                spill: None,
            }),
            live,
        }
    }

    /// Start copying every further line to `file`.
    pub fn attach_spill(&self, file: File) {
        self.write().spill = Some(LineWriter::new(file));
    }

    /// Flush and close the spill file.
    pub fn close_spill(&self) {
        if let Some(mut spill) = self.write().spill.take() {
            if let Err(e) = spill.flush() {
                warn!(error = %e, "failed to flush job log file");
            }
        }
    }

    /// Append one line and publish it to live followers.
    pub fn append(&self, stream: LogStream, line: impl Into<String>) -> u64 {
        let line = line.into();
        let mut ring = self.write();

        if let Some(pct) = parse_progress(&line) {
            ring.progress = Some(pct);
        }

        let entry = LogLine {
            seq: ring.next_seq,
            stream,
            timestamp: Utc::now(),
            line,
        };
        ring.next_seq += 1;

        if let Some(spill) = ring.spill.as_mut() {
            if let Err(e) = writeln!(spill, "[{}] {}", entry.stream.as_str(), entry.line) {
                warn!(error = %e, "job log file write failed, disabling spill");
                ring.spill = None;
            }
        }

        if ring.lines.len() >= ring.capacity {
            ring.lines.pop_front();
        }
        ring.lines.push_back(entry.clone());

        // Sent under the write lock so `follow` never misses or duplicates.
        let _ = self.live.send(entry);
        ring.next_seq - 1
    }

    /// Lines with `seq >= since`.
    pub fn since(&self, since: u64) -> LogPage {
        Self::page(&self.read(), since)
    }

    /// Buffered lines from `since` plus a receiver for every later line.
    pub fn follow(&self, since: u64) -> (LogPage, broadcast::Receiver<LogLine>) {
        let ring = self.read();
        let rx = self.live.subscribe();
        (Self::page(&ring, since), rx)
    }

    /// Last parsed progress percentage.
    pub fn progress(&self) -> Option<f32> {
        self.read().progress
    }

    fn page(ring: &LogRing, since: u64) -> LogPage {
        let first = ring.next_seq - ring.lines.len() as u64;
        let dropped = first.saturating_sub(since);
        let skip = usize::try_from(since.saturating_sub(first)).unwrap_or(usize::MAX);
        LogPage {
            lines: ring.lines.iter().skip(skip).cloned().collect(),
            next: ring.next_seq,
            dropped,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LogRing> {
        self.ring.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LogRing> {
        self.ring.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for JobLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.read();
        f.debug_struct("JobLog")
            .field("retained", &ring.lines.len())
            .field("next_seq", &ring.next_seq)
            .field("spilling", &ring.spill.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_is_visible_through_cursor_gap() {
        let log = JobLog::new(3);
        for i in 0..5 {
            log.append(LogStream::Stdout, format!("line {i}"));
        }

        let page = log.since(0);
        assert_eq!(page.dropped, 2);
        assert_eq!(page.next, 5);
        let seqs: Vec<u64> = page.lines.iter().map(|l| l.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[test]
    fn cursor_reads_only_new_lines() {
        let log = JobLog::new(10);
        log.append(LogStream::Stdout, "a");
        log.append(LogStream::Stderr, "b");
        let first = log.since(0);
        log.append(LogStream::Stdout, "c");

        let page = log.since(first.next);
        assert_eq!(page.dropped, 0);
        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].line, "c");
        assert!(log.since(page.next).lines.is_empty());
    }

    #[test]
    fn progress_is_tracked() {
        let log = JobLog::new(10);
        assert_eq!(log.progress(), None);
        log.append(
            LogStream::Stdout,
            " Update state (0x61) downloading, progress: 42.50 (100 / 200)",
        );
        assert_eq!(log.progress(), Some(42.5));
    }

    #[test]
    fn spill_receives_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.log");
        let log = JobLog::new(1);
        log.attach_spill(File::create(&path).unwrap());
        log.append(LogStream::Stdout, "first");
        log.append(LogStream::Stderr, "second");
        log.close_spill();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "[stdout] first\n[stderr] second\n");
        assert_eq!(log.since(0).lines.len(), 1);
    }

    #[tokio::test]
    async fn follow_continues_where_the_page_ends() {
        let log = JobLog::new(10);
        log.append(LogStream::Stdout, "before");
        let (page, mut rx) = log.follow(0);
        log.append(LogStream::Stdout, "after");

        assert_eq!(page.lines.len(), 1);
        let live = rx.recv().await.unwrap();
        assert_eq!(live.seq, page.next);
        assert_eq!(live.line, "after");
    }
}
