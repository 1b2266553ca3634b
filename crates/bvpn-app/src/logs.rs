//! In-memory log tail for the copy-logs action.
//!
//! Installed as the `tracing` writer: every formatted line goes to stdout
//! and into a bounded ring buffer.

use bvpn_screens::LogSource;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

/// Bounded buffer of recent log lines
#[derive(Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl LogSource for LogBuffer {
    fn recent_logs(&self) -> String {
        self.lock().iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Writer handed out per event: stdout plus the ring buffer.
pub struct TeeWriter {
    buffer: LogBuffer,
    stdout: io::Stdout,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write_all(buf)?;
        for line in String::from_utf8_lossy(buf).lines() {
            if !line.trim().is_empty() {
                self.buffer.push(line.to_string());
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> TeeWriter {
        TeeWriter {
            buffer: self.clone(),
            stdout: io::stdout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_keeps_newest() {
        let logs = LogBuffer::new(2);
        logs.push("one".into());
        logs.push("two".into());
        logs.push("three".into());

        assert_eq!(logs.len(), 2);
        assert_eq!(logs.recent_logs(), "two\nthree");
    }

    #[test]
    fn test_writer_splits_lines() {
        let logs = LogBuffer::new(8);
        let mut writer = logs.make_writer();
        writer.write_all(b" INFO Tunnel status\n\n WARN Tunnel failed\n").unwrap();

        assert_eq!(logs.recent_logs(), " INFO Tunnel status\n WARN Tunnel failed");
    }
}
