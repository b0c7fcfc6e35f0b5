//! Bounded display buffer for rendered log lines

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Default number of lines kept for display
pub const DEFAULT_CAPACITY: usize = 1000;

/// Ordered, capacity-bounded sequence of log lines (oldest evicted first)
///
/// Appends can arrive from the worker thread and the progress tap at the same
/// time; the internal mutex serializes them.
pub struct DisplayBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl DisplayBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        // A panicking writer cannot leave a VecDeque half-updated
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a line, evicting the oldest once full
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Snapshot of the current lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    /// Buffer rendered as one newline-joined block (for a text view)
    pub fn render(&self) -> String {
        let lines = self.lock();
        let mut out = String::new();
        for line in lines.iter() {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Remove all lines (a new run starts with a clean view)
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
