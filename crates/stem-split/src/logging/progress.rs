//! Unstructured diagnostic channel: progress-bar tap
//!
//! The engine reports inference progress as tqdm-style bars on its diagnostic
//! stream, redrawn in place with carriage returns:
//!
//! ```text
//!  45%|████▌     | 9/20 [00:12<00:15,  1.38s/it]
//! ```
//!
//! [`ProgressTap`] wraps the real destination of that stream, forwards every
//! byte to it unchanged, and scans complete segments for progress bars.

use std::io::{self, Write};
use std::sync::Arc;

use regex::Regex;

use crate::sink::StatusSink;

/// Drop a partial segment that never terminates past this size
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Markers that identify a progress-bar line
const PROGRESS_MARKERS: &[&str] = &["%|", "it/s]", "s/it]"];

/// Decides whether a trimmed segment is a progress bar
#[derive(Debug, Clone)]
pub struct ProgressMatcher {
    percent: Regex,
}

impl ProgressMatcher {
    pub fn new() -> Self {
        Self {
            percent: Regex::new(r"(\d{1,3}(?:\.\d+)?)%\|").expect("static regex"),
        }
    }

    /// Percentage marker or iteration-rate marker present
    pub fn is_progress(&self, segment: &str) -> bool {
        PROGRESS_MARKERS.iter().any(|m| segment.contains(m))
    }

    /// Completion fraction in `[0.0, 1.0]` when the bar shows a percentage
    pub fn fraction(&self, segment: &str) -> Option<f32> {
        let caps = self.percent.captures(segment)?;
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        Some((percent / 100.0).clamp(0.0, 1.0))
    }
}

impl Default for ProgressMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Pass-through writer that surfaces progress bars as status updates
pub struct ProgressTap<W: Write> {
    inner: W,
    sink: Arc<dyn StatusSink>,
    matcher: ProgressMatcher,
    pending: Vec<u8>,
}

impl<W: Write> ProgressTap<W> {
    /// Wrap `inner`, reporting progress lines to `sink`
    pub fn new(inner: W, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            inner,
            sink,
            matcher: ProgressMatcher::new(),
            pending: Vec::new(),
        }
    }

    /// Bytes of the retained incomplete segment
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Unwrap the original destination (any incomplete tail is discarded)
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn scan(&mut self, buf: &[u8]) {
        self.pending.extend_from_slice(buf);

        let Some(last_break) = self
            .pending
            .iter()
            .rposition(|&b| b == b'\n' || b == b'\r')
        else {
            if self.pending.len() > MAX_PENDING_BYTES {
                self.pending.clear();
            }
            return;
        };

        let complete: Vec<u8> = self.pending.drain(..=last_break).collect();
        let text = String::from_utf8_lossy(&complete);

        for segment in text.split(['\r', '\n']) {
            let segment = segment.trim();
            if segment.is_empty() || !self.matcher.is_progress(segment) {
                continue;
            }
            self.sink.update_status(segment);
            if let Some(fraction) = self.matcher.fraction(segment) {
                self.sink.update_progress(fraction);
            }
        }
    }
}

impl<W: Write> Write for ProgressTap<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // The tap observes; a broken destination must not stop the scan
        let _ = self.inner.write_all(buf);
        self.scan(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.inner.flush();
        Ok(())
    }
}
