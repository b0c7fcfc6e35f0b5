//! Progress and log funnel
//!
//! Two independent taps feed the presentation layer:
//!
//! - **Structured**: `log` records go to the console, a durable log file
//!   (full detail) and a bounded display buffer (detail stripped).
//! - **Unstructured**: the engine's diagnostic stream is passed through
//!   untouched while progress-bar lines are surfaced as status updates.

mod buffer;
mod logger;
mod progress;

pub use buffer::{DisplayBuffer, DEFAULT_CAPACITY};
pub use logger::{FunnelConfig, LogEntry, LogFunnel};
pub use progress::{ProgressMatcher, ProgressTap};
