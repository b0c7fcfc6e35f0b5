//! stem-split - audio stem separation with stable, collision-safe output names
//!
//! Runs a model-backed separation engine on one audio file and files the
//! resulting stems under predictable names (`vocal.wav`, `drums.wav`, ...)
//! in a per-track folder below a fixed output root:
//!
//! 1. **Engine cache**: keeps one loaded engine alive and reloads it only when
//!    the model or tuning changes.
//! 2. **Reconciliation**: classifies each produced file by stem keyword and
//!    moves it into place without ever overwriting an existing file.
//! 3. **Coordinator + worker**: one background run at a time, every failure
//!    caught at the run boundary.
//! 4. **Logging funnel**: console, durable log file and a bounded display log,
//!    plus progress-bar lines lifted from the engine's stderr.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod logging;
pub mod reconcile;
pub mod sink;
pub mod worker;

pub use coordinator::{
    RunOutcome, RunReport, RunState, SeparationCoordinator, SeparationRequest, Selection,
};
pub use engine::{EngineCache, EngineConfig, EngineError, OutputFormat};
pub use sink::{ChannelSink, StatusSink, UiEvent};
pub use worker::{RunHandle, SeparationWorker};
