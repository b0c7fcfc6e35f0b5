//! Outward status and log callbacks
//!
//! The core never touches a presentation layer directly. Everything it wants
//! to show goes through [`StatusSink`], which may be called from the worker
//! thread or from the progress tap's reader thread, so implementations must
//! be `Send + Sync` and marshal updates to their own thread.

use crossbeam::channel::{Receiver, Sender};

use crate::coordinator::RunState;

/// Narrow interface consumed by the presentation layer
pub trait StatusSink: Send + Sync {
    /// Append one rendered line to the log view
    fn append_log(&self, line: &str);

    /// Replace the one-line status display
    fn update_status(&self, line: &str);

    /// Completion fraction of the current separation, when the engine reports one
    fn update_progress(&self, _fraction: f32) {}

    /// A new run started; drop the previous run's log lines
    fn clear_log(&self) {}

    /// Coordinator state transition (controls enable/disable themselves on this)
    fn state_changed(&self, _state: RunState) {}
}

/// Events delivered to a front end through a channel
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Log(String),
    ClearLog,
    Status(String),
    Progress(f32),
    State(RunState),
}

/// [`StatusSink`] that forwards everything into a crossbeam channel
#[derive(Clone)]
pub struct ChannelSink {
    tx: Sender<UiEvent>,
}

impl ChannelSink {
    /// Create a sink plus the receiving end for the front end to poll
    pub fn new() -> (Self, Receiver<UiEvent>) {
        let (tx, rx) = crossbeam::channel::unbounded();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn append_log(&self, line: &str) {
        // Receiver gone means the front end is shutting down
        let _ = self.tx.send(UiEvent::Log(line.to_string()));
    }

    fn update_status(&self, line: &str) {
        let _ = self.tx.send(UiEvent::Status(line.to_string()));
    }

    fn update_progress(&self, fraction: f32) {
        let _ = self.tx.send(UiEvent::Progress(fraction));
    }

    fn clear_log(&self) {
        let _ = self.tx.send(UiEvent::ClearLog);
    }

    fn state_changed(&self, state: RunState) {
        let _ = self.tx.send(UiEvent::State(state));
    }
}

/// Sink that drops everything
pub struct NullSink;

impl StatusSink for NullSink {
    fn append_log(&self, _line: &str) {}
    fn update_status(&self, _line: &str) {}
}
